//! Bulk invoice orchestration.
//!
//! Drives an ordered sequence of orders through
//! build draft -> submit to the invoicing API -> record, and for the
//! upload flow download PDF -> upload to the marketplace -> update
//! record. Items run sequentially (the remote APIs are rate-sensitive);
//! one item's failure never aborts the batch. The result is an ordered
//! outcome list of the same length as the input.
//!
//! The orchestrator is generic over small seam traits so the
//! partial-failure behavior is testable with in-memory fakes.

use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;

use facturio_core::{InvoiceStatus, UserId};

use crate::clients::smartbill::{InvoiceDraft, IssuedInvoice};
use crate::clients::types::Order;
use crate::clients::{ClientError, SmartBillClient, TrendyolClient};
use crate::db::invoices::NewInvoiceRecord;
use crate::db::{InvoiceRepository, RepositoryError};
use crate::models::InvoiceRecord;
use crate::services::builder::{InvoiceProfile, build_draft};
use crate::services::postal::{AddressHint, PostalLookup};

// =============================================================================
// Seams
// =============================================================================

/// The invoicing API surface the orchestrator needs.
#[allow(async_fn_in_trait)]
pub trait InvoicingApi {
    /// Submit a draft, returning the issued series/number.
    async fn create_invoice(&self, draft: &InvoiceDraft) -> Result<IssuedInvoice, ClientError>;

    /// Download the PDF of an issued invoice.
    async fn invoice_pdf(&self, series: &str, number: &str) -> Result<Vec<u8>, ClientError>;
}

/// The marketplace API surface the orchestrator needs.
#[allow(async_fn_in_trait)]
pub trait MarketplaceApi {
    /// Upload an invoice PDF to a shipment package.
    async fn upload_invoice_file(
        &self,
        package_id: i64,
        pdf: Vec<u8>,
        filename: &str,
    ) -> Result<(), ClientError>;
}

/// The invoice store surface the orchestrator needs.
#[allow(async_fn_in_trait)]
pub trait InvoiceStore {
    /// The record for (user, order), if any.
    async fn get(
        &self,
        user_id: UserId,
        order_id: &str,
    ) -> Result<Option<InvoiceRecord>, RepositoryError>;

    /// Insert or replace the record for (user, order).
    async fn upsert(
        &self,
        user_id: UserId,
        record: NewInvoiceRecord<'_>,
    ) -> Result<InvoiceRecord, RepositoryError>;

    /// Update the status of an existing record.
    async fn update_status(
        &self,
        user_id: UserId,
        order_id: &str,
        status: InvoiceStatus,
    ) -> Result<(), RepositoryError>;

    /// Record (or clear) the stored artifact path.
    async fn set_pdf_path(
        &self,
        user_id: UserId,
        order_id: &str,
        pdf_path: Option<&str>,
    ) -> Result<(), RepositoryError>;
}

/// Advisory postal-code resolution.
#[allow(async_fn_in_trait)]
pub trait PostalDirectory {
    /// Resolve a postal code; `None` on any failure.
    async fn lookup(&self, postal_code: &str) -> Option<AddressHint>;
}

// =============================================================================
// Outcomes
// =============================================================================

/// The outcome of one order within a bulk run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// An invoice was issued and recorded.
    Generated {
        order_id: String,
        series: String,
        number: String,
    },
    /// The invoice PDF was pushed to the marketplace.
    Uploaded {
        order_id: String,
        series: String,
        number: String,
    },
    /// Nothing to do (already generated/uploaded and no force flag).
    Skipped { order_id: String, reason: String },
    /// The attempt failed; the batch continued.
    Failed { order_id: String, reason: String },
}

impl ItemOutcome {
    /// The order this outcome belongs to.
    #[must_use]
    pub fn order_id(&self) -> &str {
        match self {
            Self::Generated { order_id, .. }
            | Self::Uploaded { order_id, .. }
            | Self::Skipped { order_id, .. }
            | Self::Failed { order_id, .. } => order_id,
        }
    }

    /// Whether this item failed.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Summary of a bulk run: ordered per-item outcomes plus counters.
#[derive(Debug, Clone, Serialize)]
pub struct BulkOutcome {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub items: Vec<ItemOutcome>,
}

impl BulkOutcome {
    fn from_items(items: Vec<ItemOutcome>) -> Self {
        let failed = items.iter().filter(|i| i.is_failure()).count();
        let skipped = items
            .iter()
            .filter(|i| matches!(i, ItemOutcome::Skipped { .. }))
            .count();

        Self {
            total: items.len(),
            successful: items.len() - failed - skipped,
            failed,
            skipped,
            items,
        }
    }
}

// =============================================================================
// Generation flow
// =============================================================================

/// Generate invoices for an ordered batch of orders.
///
/// Idempotent without `force`: an order whose record is already
/// `generated` or `uploaded` is skipped before the invoicing API is
/// called. `failed` records are retried. With `force`, a new invoice is
/// issued and the record overwritten (last writer wins).
pub async fn bulk_generate<I, S, P>(
    invoicing: &I,
    store: &S,
    postal: &P,
    user_id: UserId,
    orders: &[Order],
    profile: &InvoiceProfile,
    issue_date: NaiveDate,
    force: bool,
) -> BulkOutcome
where
    I: InvoicingApi,
    S: InvoiceStore,
    P: PostalDirectory,
{
    let mut items = Vec::with_capacity(orders.len());
    for order in orders {
        let outcome =
            generate_one(invoicing, store, postal, user_id, order, profile, issue_date, force)
                .await;
        if let ItemOutcome::Failed { order_id, reason } = &outcome {
            tracing::warn!(order_id, reason, "invoice generation failed");
        }
        items.push(outcome);
    }

    BulkOutcome::from_items(items)
}

async fn generate_one<I, S, P>(
    invoicing: &I,
    store: &S,
    postal: &P,
    user_id: UserId,
    order: &Order,
    profile: &InvoiceProfile,
    issue_date: NaiveDate,
    force: bool,
) -> ItemOutcome
where
    I: InvoicingApi,
    S: InvoiceStore,
    P: PostalDirectory,
{
    let order_id = order.order_number.clone();

    match store.get(user_id, &order_id).await {
        Ok(Some(existing)) if !force && existing.status != InvoiceStatus::Failed => {
            return ItemOutcome::Skipped {
                order_id,
                reason: format!("invoice {} already exists", existing.display_number()),
            };
        }
        Ok(_) => {}
        Err(e) => {
            return ItemOutcome::Failed {
                order_id,
                reason: e.to_string(),
            };
        }
    }

    if order.invoice_link.is_some() && !force {
        return ItemOutcome::Skipped {
            order_id,
            reason: "an invoice is already attached on the marketplace".to_owned(),
        };
    }

    // Advisory: a failed lookup leaves the address fields blank.
    let hint = match order.billing_address().and_then(|a| a.postal_code.as_deref()) {
        Some(code) => postal.lookup(code).await,
        None => None,
    };

    let draft = build_draft(order, hint.as_ref(), profile, issue_date);
    let issued = match invoicing.create_invoice(&draft).await {
        Ok(issued) => issued,
        Err(e) => {
            return ItemOutcome::Failed {
                order_id,
                reason: e.to_string(),
            };
        }
    };

    let record = NewInvoiceRecord {
        order_id: &order_id,
        series: &issued.series,
        number: &issued.number,
        status: InvoiceStatus::Generated,
        pdf_path: None,
    };
    match store.upsert(user_id, record).await {
        Ok(_) => ItemOutcome::Generated {
            order_id,
            series: issued.series,
            number: issued.number,
        },
        Err(e) => ItemOutcome::Failed {
            order_id,
            reason: e.to_string(),
        },
    }
}

// =============================================================================
// Upload flow
// =============================================================================

/// Upload issued invoice PDFs for an ordered batch of orders.
///
/// Per item: download the PDF from the invoicing API, push it to the
/// marketplace, keep a copy under `artifact_dir` (when given), and move
/// the record to `uploaded`. Orders without a record are skipped; an
/// already-`uploaded` record is skipped without touching the store
/// unless `force` is set.
pub async fn bulk_upload<I, M, S>(
    invoicing: &I,
    marketplace: &M,
    store: &S,
    user_id: UserId,
    orders: &[Order],
    artifact_dir: Option<&Path>,
    force: bool,
) -> BulkOutcome
where
    I: InvoicingApi,
    M: MarketplaceApi,
    S: InvoiceStore,
{
    let mut items = Vec::with_capacity(orders.len());
    for order in orders {
        let outcome =
            upload_one(invoicing, marketplace, store, user_id, order, artifact_dir, force).await;
        if let ItemOutcome::Failed { order_id, reason } = &outcome {
            tracing::warn!(order_id, reason, "invoice upload failed");
        }
        items.push(outcome);
    }

    BulkOutcome::from_items(items)
}

async fn upload_one<I, M, S>(
    invoicing: &I,
    marketplace: &M,
    store: &S,
    user_id: UserId,
    order: &Order,
    artifact_dir: Option<&Path>,
    force: bool,
) -> ItemOutcome
where
    I: InvoicingApi,
    M: MarketplaceApi,
    S: InvoiceStore,
{
    let order_id = order.order_number.clone();

    let record = match store.get(user_id, &order_id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            return ItemOutcome::Skipped {
                order_id,
                reason: "no invoice generated for this order".to_owned(),
            };
        }
        Err(e) => {
            return ItemOutcome::Failed {
                order_id,
                reason: e.to_string(),
            };
        }
    };

    if record.status == InvoiceStatus::Uploaded && !force {
        return ItemOutcome::Skipped {
            order_id,
            reason: format!("invoice {} already uploaded", record.display_number()),
        };
    }

    let pdf = match invoicing.invoice_pdf(&record.series, &record.number).await {
        Ok(pdf) => pdf,
        Err(e) => {
            mark_failed(store, user_id, &order_id).await;
            return ItemOutcome::Failed {
                order_id,
                reason: e.to_string(),
            };
        }
    };

    let filename = format!("invoice_{}_{}_{}.pdf", order.id, record.series, record.number);

    if let Err(e) = marketplace
        .upload_invoice_file(order.id, pdf.clone(), &filename)
        .await
    {
        mark_failed(store, user_id, &order_id).await;
        return ItemOutcome::Failed {
            order_id,
            reason: e.to_string(),
        };
    }

    if let Some(dir) = artifact_dir {
        store_artifact(store, user_id, &order_id, dir, &filename, &pdf).await;
    }

    if let Err(e) = store.update_status(user_id, &order_id, InvoiceStatus::Uploaded).await {
        return ItemOutcome::Failed {
            order_id,
            reason: format!("uploaded, but the record could not be updated: {e}"),
        };
    }

    ItemOutcome::Uploaded {
        order_id,
        series: record.series,
        number: record.number,
    }
}

/// Move the record to `failed`, tolerating a missing record.
async fn mark_failed<S: InvoiceStore>(store: &S, user_id: UserId, order_id: &str) {
    if let Err(e) = store.update_status(user_id, order_id, InvoiceStatus::Failed).await {
        tracing::warn!(order_id, error = %e, "could not mark invoice record failed");
    }
}

/// Keep a copy of the uploaded PDF for the retention window.
///
/// Artifact storage is best-effort: a write failure is logged, never an
/// item failure.
async fn store_artifact<S: InvoiceStore>(
    store: &S,
    user_id: UserId,
    order_id: &str,
    dir: &Path,
    filename: &str,
    pdf: &[u8],
) {
    if let Err(e) = std::fs::create_dir_all(dir) {
        tracing::warn!(error = %e, "could not create invoice storage directory");
        return;
    }

    let path = dir.join(filename);
    if let Err(e) = std::fs::write(&path, pdf) {
        tracing::warn!(error = %e, path = %path.display(), "could not store invoice artifact");
        return;
    }

    if let Err(e) = store.set_pdf_path(user_id, order_id, Some(filename)).await {
        tracing::warn!(order_id, error = %e, "could not record invoice artifact path");
    }
}

// =============================================================================
// Production trait implementations
// =============================================================================

impl InvoicingApi for SmartBillClient {
    async fn create_invoice(&self, draft: &InvoiceDraft) -> Result<IssuedInvoice, ClientError> {
        SmartBillClient::create_invoice(self, draft).await
    }

    async fn invoice_pdf(&self, series: &str, number: &str) -> Result<Vec<u8>, ClientError> {
        SmartBillClient::invoice_pdf(self, series, number).await
    }
}

impl MarketplaceApi for TrendyolClient {
    async fn upload_invoice_file(
        &self,
        package_id: i64,
        pdf: Vec<u8>,
        filename: &str,
    ) -> Result<(), ClientError> {
        TrendyolClient::upload_invoice_file(self, package_id, pdf, filename, None, None).await
    }
}

impl InvoiceStore for InvoiceRepository<'_> {
    async fn get(
        &self,
        user_id: UserId,
        order_id: &str,
    ) -> Result<Option<InvoiceRecord>, RepositoryError> {
        InvoiceRepository::get(self, user_id, order_id).await
    }

    async fn upsert(
        &self,
        user_id: UserId,
        record: NewInvoiceRecord<'_>,
    ) -> Result<InvoiceRecord, RepositoryError> {
        InvoiceRepository::upsert(self, user_id, record).await
    }

    async fn update_status(
        &self,
        user_id: UserId,
        order_id: &str,
        status: InvoiceStatus,
    ) -> Result<(), RepositoryError> {
        InvoiceRepository::update_status(self, user_id, order_id, status).await
    }

    async fn set_pdf_path(
        &self,
        user_id: UserId,
        order_id: &str,
        pdf_path: Option<&str>,
    ) -> Result<(), RepositoryError> {
        InvoiceRepository::set_pdf_path(self, user_id, order_id, pdf_path).await
    }
}

impl PostalDirectory for PostalLookup {
    async fn lookup(&self, postal_code: &str) -> Option<AddressHint> {
        PostalLookup::lookup(self, postal_code).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

    use chrono::Utc;
    use facturio_core::InvoiceRecordId;

    // =========================================================================
    // Fakes
    // =========================================================================

    #[derive(Default)]
    struct FakeInvoicing {
        /// Order numbers whose submission should time out.
        fail_create: HashSet<String>,
        /// (series, number) pairs whose PDF download should fail.
        fail_pdf: HashSet<(String, String)>,
        counter: AtomicU32,
        create_calls: AtomicU32,
    }

    impl InvoicingApi for FakeInvoicing {
        async fn create_invoice(
            &self,
            draft: &InvoiceDraft,
        ) -> Result<IssuedInvoice, ClientError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_create.contains(&draft.order_number) {
                return Err(ClientError::Upstream {
                    status: 504,
                    message: "timeout".to_owned(),
                });
            }
            let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(IssuedInvoice {
                series: "FCT".to_owned(),
                number: format!("{n:04}"),
            })
        }

        async fn invoice_pdf(&self, series: &str, number: &str) -> Result<Vec<u8>, ClientError> {
            if self.fail_pdf.contains(&(series.to_owned(), number.to_owned())) {
                return Err(ClientError::NotFound(format!("invoice {series}-{number}")));
            }
            Ok(b"%PDF-1.4 fake".to_vec())
        }
    }

    #[derive(Default)]
    struct FakeMarketplace {
        fail_packages: HashSet<i64>,
        uploads: Mutex<Vec<(i64, String)>>,
    }

    impl MarketplaceApi for FakeMarketplace {
        async fn upload_invoice_file(
            &self,
            package_id: i64,
            _pdf: Vec<u8>,
            filename: &str,
        ) -> Result<(), ClientError> {
            if self.fail_packages.contains(&package_id) {
                return Err(ClientError::Upstream {
                    status: 500,
                    message: "upload rejected".to_owned(),
                });
            }
            self.uploads
                .lock()
                .expect("lock")
                .push((package_id, filename.to_owned()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeStore {
        records: Mutex<HashMap<(i32, String), InvoiceRecord>>,
        next_id: AtomicI32,
    }

    impl FakeStore {
        fn seed(&self, user: i32, order_id: &str, series: &str, number: &str, status: InvoiceStatus) {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let record = InvoiceRecord {
                id: InvoiceRecordId::new(id),
                user_id: UserId::new(user),
                order_id: order_id.to_owned(),
                series: series.to_owned(),
                number: number.to_owned(),
                status,
                pdf_path: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            self.records
                .lock()
                .expect("lock")
                .insert((user, order_id.to_owned()), record);
        }

        fn record(&self, user: i32, order_id: &str) -> Option<InvoiceRecord> {
            self.records
                .lock()
                .expect("lock")
                .get(&(user, order_id.to_owned()))
                .cloned()
        }

        fn len(&self) -> usize {
            self.records.lock().expect("lock").len()
        }
    }

    impl InvoiceStore for FakeStore {
        async fn get(
            &self,
            user_id: UserId,
            order_id: &str,
        ) -> Result<Option<InvoiceRecord>, RepositoryError> {
            Ok(self.record(user_id.as_i32(), order_id))
        }

        async fn upsert(
            &self,
            user_id: UserId,
            record: NewInvoiceRecord<'_>,
        ) -> Result<InvoiceRecord, RepositoryError> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let stored = InvoiceRecord {
                id: InvoiceRecordId::new(id),
                user_id,
                order_id: record.order_id.to_owned(),
                series: record.series.to_owned(),
                number: record.number.to_owned(),
                status: record.status,
                pdf_path: record.pdf_path.map(ToOwned::to_owned),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            self.records
                .lock()
                .expect("lock")
                .insert((user_id.as_i32(), record.order_id.to_owned()), stored.clone());
            Ok(stored)
        }

        async fn update_status(
            &self,
            user_id: UserId,
            order_id: &str,
            status: InvoiceStatus,
        ) -> Result<(), RepositoryError> {
            let mut records = self.records.lock().expect("lock");
            let record = records
                .get_mut(&(user_id.as_i32(), order_id.to_owned()))
                .ok_or(RepositoryError::NotFound)?;
            record.status = status;
            Ok(())
        }

        async fn set_pdf_path(
            &self,
            user_id: UserId,
            order_id: &str,
            pdf_path: Option<&str>,
        ) -> Result<(), RepositoryError> {
            let mut records = self.records.lock().expect("lock");
            let record = records
                .get_mut(&(user_id.as_i32(), order_id.to_owned()))
                .ok_or(RepositoryError::NotFound)?;
            record.pdf_path = pdf_path.map(ToOwned::to_owned);
            Ok(())
        }
    }

    struct NoPostal;

    impl PostalDirectory for NoPostal {
        async fn lookup(&self, _postal_code: &str) -> Option<AddressHint> {
            None
        }
    }

    // =========================================================================
    // Fixtures
    // =========================================================================

    fn order(package_id: i64, order_number: &str) -> Order {
        serde_json::from_value(serde_json::json!({
            "id": package_id,
            "orderNumber": order_number,
            "currencyCode": "RON",
            "lines": [{"merchantSku": "SKU-1", "productName": "Produs",
                       "quantity": 1, "price": 100.0, "vatRate": 19}],
        }))
        .expect("order fixture")
    }

    fn profile() -> InvoiceProfile {
        InvoiceProfile {
            company_vat_code: "RO12345678".into(),
            series_name: "FCT".into(),
            warehouse: None,
        }
    }

    fn issue_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).expect("date")
    }

    const USER: UserId = UserId::new(1);

    // =========================================================================
    // Generation
    // =========================================================================

    #[tokio::test]
    async fn test_batch_continues_past_failed_item() {
        let invoicing = FakeInvoicing {
            fail_create: HashSet::from(["ORD-2".to_owned()]),
            ..FakeInvoicing::default()
        };
        let store = FakeStore::default();
        let orders = vec![order(1, "ORD-1"), order(2, "ORD-2"), order(3, "ORD-3")];

        let outcome = bulk_generate(
            &invoicing,
            &store,
            &NoPostal,
            USER,
            &orders,
            &profile(),
            issue_date(),
            false,
        )
        .await;

        // Result list has one entry per order, in input order.
        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.items.len(), 3);
        assert_eq!(outcome.successful, 2);
        assert_eq!(outcome.failed, 1);
        let order_ids: Vec<&str> = outcome.items.iter().map(ItemOutcome::order_id).collect();
        assert_eq!(order_ids, vec!["ORD-1", "ORD-2", "ORD-3"]);

        assert!(matches!(outcome.items[0], ItemOutcome::Generated { .. }));
        match &outcome.items[1] {
            ItemOutcome::Failed { reason, .. } => assert!(reason.contains("timeout")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(matches!(outcome.items[2], ItemOutcome::Generated { .. }));

        // Only the successful orders got records.
        assert!(store.record(1, "ORD-1").is_some());
        assert!(store.record(1, "ORD-2").is_none());
        assert!(store.record(1, "ORD-3").is_some());
    }

    #[tokio::test]
    async fn test_resubmission_without_force_is_idempotent() {
        let invoicing = FakeInvoicing::default();
        let store = FakeStore::default();
        store.seed(1, "ORD-1", "FCT", "0007", InvoiceStatus::Generated);
        let before = store.record(1, "ORD-1").expect("seeded");

        let outcome = bulk_generate(
            &invoicing,
            &store,
            &NoPostal,
            USER,
            &[order(1, "ORD-1")],
            &profile(),
            issue_date(),
            false,
        )
        .await;

        assert!(matches!(outcome.items[0], ItemOutcome::Skipped { .. }));
        // The invoicing API was never called and the record is untouched.
        assert_eq!(invoicing.create_calls.load(Ordering::SeqCst), 0);
        let after = store.record(1, "ORD-1").expect("still there");
        assert_eq!(after.number, before.number);
        assert_eq!(after.status, before.status);
    }

    #[tokio::test]
    async fn test_force_regenerates_and_overwrites() {
        let invoicing = FakeInvoicing::default();
        let store = FakeStore::default();
        store.seed(1, "ORD-1", "FCT", "0007", InvoiceStatus::Uploaded);

        let outcome = bulk_generate(
            &invoicing,
            &store,
            &NoPostal,
            USER,
            &[order(1, "ORD-1")],
            &profile(),
            issue_date(),
            true,
        )
        .await;

        assert!(matches!(outcome.items[0], ItemOutcome::Generated { .. }));
        let record = store.record(1, "ORD-1").expect("record");
        assert_eq!(record.number, "0001");
        assert_eq!(record.status, InvoiceStatus::Generated);
    }

    #[tokio::test]
    async fn test_failed_record_is_retried_without_force() {
        let invoicing = FakeInvoicing::default();
        let store = FakeStore::default();
        store.seed(1, "ORD-1", "FCT", "0007", InvoiceStatus::Failed);

        let outcome = bulk_generate(
            &invoicing,
            &store,
            &NoPostal,
            USER,
            &[order(1, "ORD-1")],
            &profile(),
            issue_date(),
            false,
        )
        .await;

        assert!(matches!(outcome.items[0], ItemOutcome::Generated { .. }));
        let record = store.record(1, "ORD-1").expect("record");
        assert_eq!(record.status, InvoiceStatus::Generated);
    }

    #[tokio::test]
    async fn test_marketplace_attached_invoice_is_skipped() {
        let invoicing = FakeInvoicing::default();
        let store = FakeStore::default();
        let mut with_link = order(1, "ORD-1");
        with_link.invoice_link = Some("https://cdn.example.com/invoice.pdf".into());

        let outcome = bulk_generate(
            &invoicing,
            &store,
            &NoPostal,
            USER,
            &[with_link],
            &profile(),
            issue_date(),
            false,
        )
        .await;

        assert!(matches!(outcome.items[0], ItemOutcome::Skipped { .. }));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_tenants_with_same_order_id_are_independent() {
        let invoicing = FakeInvoicing::default();
        let store = FakeStore::default();
        // Tenant 2 already invoiced the same order number.
        store.seed(2, "ORD-1", "FCT", "0042", InvoiceStatus::Uploaded);

        let outcome = bulk_generate(
            &invoicing,
            &store,
            &NoPostal,
            USER,
            &[order(1, "ORD-1")],
            &profile(),
            issue_date(),
            false,
        )
        .await;

        // Tenant 1 generates independently of tenant 2's record.
        assert!(matches!(outcome.items[0], ItemOutcome::Generated { .. }));
        assert_eq!(store.record(2, "ORD-1").expect("tenant 2 record").number, "0042");
        assert!(store.record(1, "ORD-1").is_some());
    }

    // =========================================================================
    // Upload
    // =========================================================================

    #[tokio::test]
    async fn test_upload_happy_path() {
        let invoicing = FakeInvoicing::default();
        let marketplace = FakeMarketplace::default();
        let store = FakeStore::default();
        store.seed(1, "ORD-1", "FCT", "0001", InvoiceStatus::Generated);

        let outcome = bulk_upload(
            &invoicing,
            &marketplace,
            &store,
            USER,
            &[order(101, "ORD-1")],
            None,
            false,
        )
        .await;

        assert!(matches!(outcome.items[0], ItemOutcome::Uploaded { .. }));
        assert_eq!(
            store.record(1, "ORD-1").expect("record").status,
            InvoiceStatus::Uploaded
        );
        let uploads = marketplace.uploads.lock().expect("lock");
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0], (101, "invoice_101_FCT_0001.pdf".to_owned()));
    }

    #[tokio::test]
    async fn test_upload_without_record_is_skipped() {
        let invoicing = FakeInvoicing::default();
        let marketplace = FakeMarketplace::default();
        let store = FakeStore::default();

        let outcome = bulk_upload(
            &invoicing,
            &marketplace,
            &store,
            USER,
            &[order(101, "ORD-1")],
            None,
            false,
        )
        .await;

        assert!(matches!(outcome.items[0], ItemOutcome::Skipped { .. }));
        assert!(marketplace.uploads.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn test_upload_already_uploaded_is_skipped_untouched() {
        let invoicing = FakeInvoicing::default();
        let marketplace = FakeMarketplace::default();
        let store = FakeStore::default();
        store.seed(1, "ORD-1", "FCT", "0001", InvoiceStatus::Uploaded);
        let before = store.record(1, "ORD-1").expect("seeded");

        let outcome = bulk_upload(
            &invoicing,
            &marketplace,
            &store,
            USER,
            &[order(101, "ORD-1")],
            None,
            false,
        )
        .await;

        assert!(matches!(outcome.items[0], ItemOutcome::Skipped { .. }));
        assert!(marketplace.uploads.lock().expect("lock").is_empty());
        let after = store.record(1, "ORD-1").expect("record");
        assert_eq!(after.status, before.status);
        assert_eq!(after.number, before.number);
    }

    #[tokio::test]
    async fn test_upload_pdf_download_failure_marks_record_failed() {
        let invoicing = FakeInvoicing {
            fail_pdf: HashSet::from([("FCT".to_owned(), "0001".to_owned())]),
            ..FakeInvoicing::default()
        };
        let marketplace = FakeMarketplace::default();
        let store = FakeStore::default();
        store.seed(1, "ORD-1", "FCT", "0001", InvoiceStatus::Generated);
        store.seed(1, "ORD-2", "FCT", "0002", InvoiceStatus::Generated);

        let outcome = bulk_upload(
            &invoicing,
            &marketplace,
            &store,
            USER,
            &[order(101, "ORD-1"), order(102, "ORD-2")],
            None,
            false,
        )
        .await;

        assert!(outcome.items[0].is_failure());
        assert!(matches!(outcome.items[1], ItemOutcome::Uploaded { .. }));
        assert_eq!(
            store.record(1, "ORD-1").expect("record").status,
            InvoiceStatus::Failed
        );
        assert_eq!(
            store.record(1, "ORD-2").expect("record").status,
            InvoiceStatus::Uploaded
        );
    }

    #[tokio::test]
    async fn test_upload_marketplace_rejection_marks_record_failed() {
        let invoicing = FakeInvoicing::default();
        let marketplace = FakeMarketplace {
            fail_packages: HashSet::from([101]),
            ..FakeMarketplace::default()
        };
        let store = FakeStore::default();
        store.seed(1, "ORD-1", "FCT", "0001", InvoiceStatus::Generated);

        let outcome = bulk_upload(
            &invoicing,
            &marketplace,
            &store,
            USER,
            &[order(101, "ORD-1")],
            None,
            false,
        )
        .await;

        assert!(outcome.items[0].is_failure());
        assert_eq!(
            store.record(1, "ORD-1").expect("record").status,
            InvoiceStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_upload_stores_artifact_and_records_path() {
        let invoicing = FakeInvoicing::default();
        let marketplace = FakeMarketplace::default();
        let store = FakeStore::default();
        store.seed(1, "ORD-1", "FCT", "0001", InvoiceStatus::Generated);

        let dir = tempfile::tempdir().expect("tempdir");
        let outcome = bulk_upload(
            &invoicing,
            &marketplace,
            &store,
            USER,
            &[order(101, "ORD-1")],
            Some(dir.path()),
            false,
        )
        .await;

        assert!(matches!(outcome.items[0], ItemOutcome::Uploaded { .. }));
        let record = store.record(1, "ORD-1").expect("record");
        let filename = record.pdf_path.expect("artifact path recorded");
        assert_eq!(filename, "invoice_101_FCT_0001.pdf");
        assert!(dir.path().join(&filename).is_file());
    }

    #[tokio::test]
    async fn test_upload_failed_record_is_retried() {
        let invoicing = FakeInvoicing::default();
        let marketplace = FakeMarketplace::default();
        let store = FakeStore::default();
        store.seed(1, "ORD-1", "FCT", "0001", InvoiceStatus::Failed);

        let outcome = bulk_upload(
            &invoicing,
            &marketplace,
            &store,
            USER,
            &[order(101, "ORD-1")],
            None,
            false,
        )
        .await;

        assert!(matches!(outcome.items[0], ItemOutcome::Uploaded { .. }));
        assert_eq!(
            store.record(1, "ORD-1").expect("record").status,
            InvoiceStatus::Uploaded
        );
    }
}
