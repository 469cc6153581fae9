//! Read side of the sale ledger.

use chrono::{DateTime, Utc};

use till_core::{now_millis, PaymentMethod, Sale, SaleFilter, SalesStats, StatsPeriod};
use till_db::SaleLedger;

use crate::error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct SalesService {
    ledger: SaleLedger,
}

impl SalesService {
    pub fn new(ledger: SaleLedger) -> Self {
        SalesService { ledger }
    }

    /// Every sale, oldest first.
    pub async fn list(&self) -> ApiResult<Vec<Sale>> {
        Ok(self.ledger.list_all().await?)
    }

    pub async fn get(&self, id: &str) -> ApiResult<Sale> {
        self.ledger
            .get_by_id(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Sale", id))
    }

    pub async fn by_range(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> ApiResult<Vec<Sale>> {
        Ok(self.ledger.list_by_range(start, end).await?)
    }

    pub async fn by_payment_method(&self, method: PaymentMethod) -> ApiResult<Vec<Sale>> {
        Ok(self.ledger.list_by_payment_method(method).await?)
    }

    pub async fn filter(&self, filter: &SaleFilter) -> ApiResult<Vec<Sale>> {
        Ok(self.ledger.filter(filter).await?)
    }

    /// Totals for the window ending now.
    pub async fn stats(&self, period: StatsPeriod) -> ApiResult<SalesStats> {
        Ok(self.ledger.stats(period, now_millis()).await?)
    }
}
