//! In-memory Storage used by engine and coordinator tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{ArbOpportunity, ExchangeOrder, OrderStatus};
use crate::storage::{round_money, Storage, StorageError};

/// MemoryStorage keeps rounded copies in hash maps, mirroring the
/// persistence-boundary behavior of the SQLite implementation.
#[derive(Default)]
pub struct MemoryStorage {
    opportunities: Mutex<HashMap<String, ArbOpportunity>>,
    orders: Mutex<HashMap<String, ExchangeOrder>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn rounded_opportunity(opp: &ArbOpportunity) -> ArbOpportunity {
        let mut copy = opp.clone();
        copy.source_rate = round_money(copy.source_rate);
        copy.dest_rate = round_money(copy.dest_rate);
        copy.percentage = round_money(copy.percentage);
        copy
    }

    fn rounded_order(order: &ExchangeOrder) -> ExchangeOrder {
        let mut copy = order.clone();
        copy.source_amount = copy.source_amount.map(round_money);
        copy.dest_amount = copy.dest_amount.map(round_money);
        copy.rate = copy.rate.map(round_money);
        copy.fees = copy.fees.map(round_money);
        copy.achieved_source_amount = copy.achieved_source_amount.map(round_money);
        copy.achieved_dest_amount = copy.achieved_dest_amount.map(round_money);
        copy.achieved_rate = copy.achieved_rate.map(round_money);
        copy
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save_opportunity(
        &self,
        opp: &ArbOpportunity,
    ) -> Result<ArbOpportunity, StorageError> {
        let copy = Self::rounded_opportunity(opp);
        self.opportunities
            .lock()
            .unwrap()
            .insert(copy.id.clone(), copy.clone());
        Ok(copy)
    }

    async fn opportunity_by_id(
        &self,
        id: &str,
    ) -> Result<Option<ArbOpportunity>, StorageError> {
        Ok(self.opportunities.lock().unwrap().get(id).cloned())
    }

    async fn save_order(&self, order: &ExchangeOrder) -> Result<ExchangeOrder, StorageError> {
        let copy = Self::rounded_order(order);
        self.orders
            .lock()
            .unwrap()
            .insert(copy.id.clone(), copy.clone());
        Ok(copy)
    }

    async fn order_by_id(&self, id: &str) -> Result<Option<ExchangeOrder>, StorageError> {
        Ok(self.orders.lock().unwrap().get(id).cloned())
    }

    async fn orders_by_status(
        &self,
        status: OrderStatus,
    ) -> Result<Vec<ExchangeOrder>, StorageError> {
        let mut orders: Vec<ExchangeOrder> = self
            .orders
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.status == status)
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }

    async fn orders_by_opportunity(
        &self,
        id: &str,
    ) -> Result<Vec<ExchangeOrder>, StorageError> {
        let mut orders: Vec<ExchangeOrder> = self
            .orders
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.arb_opportunity_id.as_deref() == Some(id))
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
