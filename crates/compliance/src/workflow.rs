//! FIRS compliance transitions.
//!
//! Every transition follows the same shape: authorize, claim the invoice,
//! re-fetch its latest state, check guards on that state, then make exactly
//! one gateway call. Guard failures never reach the network.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use taxlink_auth::{AuthContext, AuthzError, Permission, authorize_for_tenant};
use taxlink_core::{DomainError, InFlight, InvoiceId, LineItemId, TenantId, ValidationError};

use crate::invoice::{
    FirsFields, FirsStatus, GuardError, Invoice, PaymentStatus, validate_classification,
};
use crate::report::ComplianceReport;

/// Compliance backend failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("invoice {0} not found")]
    NotFound(InvoiceId),
    #[error("rejected by FIRS: {0}")]
    Rejected(ComplianceReport),
    #[error("compliance gateway unavailable: {0}")]
    Unavailable(String),
}

/// The authoritative compliance backend.
#[async_trait]
pub trait ComplianceGateway: Send + Sync {
    async fn fetch(&self, tenant_id: TenantId, id: InvoiceId) -> Result<Option<Invoice>, GatewayError>;

    /// Submit for FIRS validation. On success the invoice comes back
    /// `validated` with its IRN assigned.
    async fn validate(&self, tenant_id: TenantId, id: InvoiceId) -> Result<Invoice, GatewayError>;

    async fn sign(&self, tenant_id: TenantId, id: InvoiceId) -> Result<Invoice, GatewayError>;

    async fn update_payment(
        &self,
        tenant_id: TenantId,
        id: InvoiceId,
        status: PaymentStatus,
    ) -> Result<Invoice, GatewayError>;

    async fn update_firs_fields(
        &self,
        tenant_id: TenantId,
        id: InvoiceId,
        fields: &FirsFields,
    ) -> Result<Invoice, GatewayError>;

    async fn update_line_classification(
        &self,
        tenant_id: TenantId,
        id: InvoiceId,
        item_id: LineItemId,
        code: &str,
    ) -> Result<Invoice, GatewayError>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ComplianceError {
    #[error(transparent)]
    Guard(#[from] GuardError),

    /// FIRS (or the local pre-check) refused the invoice.
    #[error("{0}")]
    Rejected(ComplianceReport),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Unauthorized(#[from] AuthzError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("invoice {0} not found")]
    NotFound(InvoiceId),

    #[error("compliance gateway unavailable: {0}")]
    Gateway(String),
}

impl From<GatewayError> for ComplianceError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::NotFound(id) => ComplianceError::NotFound(id),
            GatewayError::Rejected(report) => ComplianceError::Rejected(report),
            GatewayError::Unavailable(msg) => ComplianceError::Gateway(msg),
        }
    }
}

pub struct ComplianceWorkflow {
    gateway: Arc<dyn ComplianceGateway>,
    inflight: InFlight<InvoiceId>,
}

impl ComplianceWorkflow {
    pub fn new(gateway: Arc<dyn ComplianceGateway>) -> Self {
        Self {
            gateway,
            inflight: InFlight::new(),
        }
    }

    pub async fn get(&self, ctx: &AuthContext, id: InvoiceId) -> Result<Invoice, ComplianceError> {
        authorize_for_tenant(ctx, ctx.tenant_id, Permission::ViewInvoices)?;
        self.latest(ctx.tenant_id, id).await
    }

    /// Validate with FIRS; on success the IRN is assigned.
    pub async fn validate(&self, ctx: &AuthContext, id: InvoiceId) -> Result<Invoice, ComplianceError> {
        authorize_for_tenant(ctx, ctx.tenant_id, Permission::ValidateInvoices)?;
        let _claim = self.inflight.claim(id)?;

        let invoice = self.latest(ctx.tenant_id, id).await?;
        guarded(&invoice, "validate", invoice.ensure_can_validate())?;

        let local = invoice.structural_errors();
        if !local.is_empty() {
            let report = ComplianceReport {
                errors: local,
                ..ComplianceReport::default()
            };
            tracing::warn!(invoice = %id, summary = %report.summary(3), "invoice failed local checks");
            return Err(ComplianceError::Rejected(report));
        }

        let validated = self.gateway.validate(ctx.tenant_id, id).await.map_err(|e| {
            if let GatewayError::Rejected(report) = &e {
                tracing::warn!(invoice = %id, summary = %report.summary(3), "FIRS validation rejected");
            }
            ComplianceError::from(e)
        })?;

        if validated.firs_status != FirsStatus::Validated || validated.firs_irn.is_none() {
            return Err(DomainError::invariant(format!(
                "gateway reported success but invoice {id} is {} without an IRN",
                validated.firs_status
            ))
            .into());
        }
        tracing::info!(invoice = %id, irn = validated.firs_irn.as_deref().unwrap_or(""), "invoice validated");
        Ok(validated)
    }

    pub async fn sign(&self, ctx: &AuthContext, id: InvoiceId) -> Result<Invoice, ComplianceError> {
        authorize_for_tenant(ctx, ctx.tenant_id, Permission::SignInvoices)?;
        let _claim = self.inflight.claim(id)?;

        let invoice = self.latest(ctx.tenant_id, id).await?;
        guarded(&invoice, "sign", invoice.ensure_can_sign())?;

        let signed = self.gateway.sign(ctx.tenant_id, id).await?;
        tracing::info!(invoice = %id, status = %signed.firs_status, "invoice signed");
        Ok(signed)
    }

    pub async fn update_firs_fields(
        &self,
        ctx: &AuthContext,
        id: InvoiceId,
        fields: FirsFields,
    ) -> Result<Invoice, ComplianceError> {
        authorize_for_tenant(ctx, ctx.tenant_id, Permission::EditFirsFields)?;
        fields.validate()?;
        let _claim = self.inflight.claim(id)?;

        let invoice = self.latest(ctx.tenant_id, id).await?;
        guarded(&invoice, "update FIRS fields", invoice.ensure_fields_editable())?;

        let updated = self.gateway.update_firs_fields(ctx.tenant_id, id, &fields).await?;
        tracing::info!(invoice = %id, type_code = fields.type_code.code(), "FIRS fields updated");
        Ok(updated)
    }

    pub async fn update_payment(
        &self,
        ctx: &AuthContext,
        id: InvoiceId,
        status: PaymentStatus,
    ) -> Result<Invoice, ComplianceError> {
        authorize_for_tenant(ctx, ctx.tenant_id, Permission::UpdateInvoicePayment)?;
        let _claim = self.inflight.claim(id)?;

        let invoice = self.latest(ctx.tenant_id, id).await?;
        guarded(&invoice, "update payment", invoice.ensure_payment_transition(status))?;

        let updated = self.gateway.update_payment(ctx.tenant_id, id, status).await?;
        tracing::info!(invoice = %id, payment = %status, "payment status updated");
        Ok(updated)
    }

    pub async fn update_line_classification(
        &self,
        ctx: &AuthContext,
        id: InvoiceId,
        item_id: LineItemId,
        code: &str,
    ) -> Result<Invoice, ComplianceError> {
        authorize_for_tenant(ctx, ctx.tenant_id, Permission::EditFirsFields)?;
        validate_classification(code)?;
        let _claim = self.inflight.claim(id)?;

        let invoice = self.latest(ctx.tenant_id, id).await?;
        guarded(&invoice, "classify line", invoice.ensure_fields_editable())?;
        if invoice.item(item_id).is_none() {
            return Err(ValidationError::field("item_id", format!("no line item {item_id} on this invoice")).into());
        }

        let code = code.trim();
        let updated = self
            .gateway
            .update_line_classification(ctx.tenant_id, id, item_id, code)
            .await?;
        tracing::info!(invoice = %id, item = %item_id, code, "line classification updated");
        Ok(updated)
    }

    async fn latest(&self, tenant_id: TenantId, id: InvoiceId) -> Result<Invoice, ComplianceError> {
        let invoice = self
            .gateway
            .fetch(tenant_id, id)
            .await?
            .ok_or(ComplianceError::NotFound(id))?;
        if invoice.tenant_id != tenant_id {
            return Err(DomainError::invariant("tenant mismatch").into());
        }
        Ok(invoice)
    }
}

fn guarded(invoice: &Invoice, action: &str, check: Result<(), GuardError>) -> Result<(), GuardError> {
    if let Err(e) = &check {
        tracing::warn!(invoice = %invoice.id, action, firs_status = %invoice.firs_status, reason = %e, "transition refused");
    }
    check
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::fixtures::invoice;
    use crate::invoice::BusinessStatus;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use taxlink_auth::Role;
    use taxlink_core::UserId;

    /// Applies transitions to a single stored invoice and counts mutating calls.
    #[derive(Default)]
    struct FakeGateway {
        invoices: Mutex<HashMap<InvoiceId, Invoice>>,
        calls: AtomicUsize,
        reject_with: Option<ComplianceReport>,
    }

    impl FakeGateway {
        fn with(invoice: Invoice) -> Self {
            let gateway = Self::default();
            gateway.invoices.lock().unwrap().insert(invoice.id, invoice);
            gateway
        }

        fn mutate(&self, id: InvoiceId, f: impl FnOnce(&mut Invoice)) -> Result<Invoice, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut invoices = self.invoices.lock().unwrap();
            let invoice = invoices.get_mut(&id).ok_or(GatewayError::NotFound(id))?;
            f(invoice);
            Ok(invoice.clone())
        }
    }

    #[async_trait]
    impl ComplianceGateway for FakeGateway {
        async fn fetch(&self, _: TenantId, id: InvoiceId) -> Result<Option<Invoice>, GatewayError> {
            Ok(self.invoices.lock().unwrap().get(&id).cloned())
        }

        async fn validate(&self, _: TenantId, id: InvoiceId) -> Result<Invoice, GatewayError> {
            if let Some(report) = &self.reject_with {
                self.calls.fetch_add(1, Ordering::SeqCst);
                return Err(GatewayError::Rejected(report.clone()));
            }
            self.mutate(id, |inv| {
                inv.firs_status = FirsStatus::Validated;
                inv.firs_irn = Some(format!("{}-94019CE5-20250502", inv.number));
            })
        }

        async fn sign(&self, _: TenantId, id: InvoiceId) -> Result<Invoice, GatewayError> {
            self.mutate(id, |inv| inv.firs_status = FirsStatus::Signed)
        }

        async fn update_payment(
            &self,
            _: TenantId,
            id: InvoiceId,
            status: PaymentStatus,
        ) -> Result<Invoice, GatewayError> {
            self.mutate(id, |inv| {
                inv.payment_status = status;
                if status == PaymentStatus::Paid {
                    inv.business_status = BusinessStatus::Paid;
                }
            })
        }

        async fn update_firs_fields(
            &self,
            _: TenantId,
            id: InvoiceId,
            fields: &FirsFields,
        ) -> Result<Invoice, GatewayError> {
            let fields = fields.clone();
            self.mutate(id, move |inv| {
                inv.firs_invoice_type_code = Some(fields.type_code);
                inv.firs_note = fields.note;
                inv.previous_invoice_irn = fields.previous_irn;
            })
        }

        async fn update_line_classification(
            &self,
            _: TenantId,
            id: InvoiceId,
            item_id: LineItemId,
            code: &str,
        ) -> Result<Invoice, GatewayError> {
            let code = code.to_string();
            self.mutate(id, move |inv| {
                if let Some(item) = inv.items.iter_mut().find(|i| i.id == item_id) {
                    item.classification_code = Some(code);
                }
            })
        }
    }

    fn setup(invoice: Invoice) -> (ComplianceWorkflow, Arc<FakeGateway>, AuthContext) {
        let ctx = AuthContext::new(UserId::new(), invoice.tenant_id, vec![Role::Company]);
        let gateway = Arc::new(FakeGateway::with(invoice));
        (ComplianceWorkflow::new(gateway.clone()), gateway, ctx)
    }

    fn calls(gateway: &FakeGateway) -> usize {
        gateway.calls.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn paid_succeeds_once_then_is_refused() {
        let signed = invoice(FirsStatus::Signed);
        let id = signed.id;
        let (workflow, gateway, ctx) = setup(signed);

        let paid = workflow.update_payment(&ctx, id, PaymentStatus::Paid).await.unwrap();
        assert_eq!(paid.business_status, BusinessStatus::Paid);

        let err = workflow.update_payment(&ctx, id, PaymentStatus::Paid).await.unwrap_err();
        assert_eq!(err, ComplianceError::Guard(GuardError::RedundantPayment(PaymentStatus::Paid)));
        assert_eq!(calls(&gateway), 1);
    }

    #[tokio::test]
    async fn validate_then_sign_walks_the_state_machine() {
        let draft = invoice(FirsStatus::None);
        let id = draft.id;
        let (workflow, _gateway, ctx) = setup(draft);

        let validated = workflow.validate(&ctx, id).await.unwrap();
        assert_eq!(validated.firs_status, FirsStatus::Validated);
        assert!(validated.firs_irn.is_some());

        // Validation is not repeatable once it succeeded.
        assert!(matches!(
            workflow.validate(&ctx, id).await,
            Err(ComplianceError::Guard(GuardError::WrongStatus { .. }))
        ));

        let signed = workflow.sign(&ctx, id).await.unwrap();
        assert_eq!(signed.firs_status, FirsStatus::Signed);
    }

    #[tokio::test]
    async fn sign_guard_failure_never_calls_the_gateway() {
        let pending = invoice(FirsStatus::Pending);
        let id = pending.id;
        let (workflow, gateway, ctx) = setup(pending);

        assert!(workflow.sign(&ctx, id).await.is_err());
        assert_eq!(calls(&gateway), 0);
    }

    #[tokio::test]
    async fn gateway_rejection_keeps_the_full_report() {
        let draft = invoice(FirsStatus::Pending);
        let id = draft.id;
        let report = ComplianceReport::new()
            .error("buyer TIN missing")
            .error("HS code invalid")
            .warning("note empty")
            .suggestion("use code 380");
        let ctx = AuthContext::new(UserId::new(), draft.tenant_id, vec![Role::Company]);
        let mut gateway = FakeGateway::with(draft);
        gateway.reject_with = Some(report.clone());
        let workflow = ComplianceWorkflow::new(Arc::new(gateway));

        let err = workflow.validate(&ctx, id).await.unwrap_err();
        assert_eq!(err, ComplianceError::Rejected(report));
        assert_eq!(workflow.get(&ctx, id).await.unwrap().firs_status, FirsStatus::Pending);
    }

    #[tokio::test]
    async fn local_checks_reject_without_a_round_trip() {
        let mut empty = invoice(FirsStatus::None);
        empty.items.clear();
        let id = empty.id;
        let (workflow, gateway, ctx) = setup(empty);

        match workflow.validate(&ctx, id).await.unwrap_err() {
            ComplianceError::Rejected(report) => assert_eq!(report.errors.len(), 1),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(calls(&gateway), 0);
    }

    #[tokio::test]
    async fn firs_fields_are_checked_before_anything_else() {
        let draft = invoice(FirsStatus::Validated);
        let id = draft.id;
        let (workflow, gateway, ctx) = setup(draft);

        let err = workflow
            .update_firs_fields(&ctx, id, FirsFields::new(crate::InvoiceTypeCode::CreditNote))
            .await
            .unwrap_err();
        assert!(matches!(err, ComplianceError::Validation(ref v) if v.contains("previous_invoice_irn")));
        assert_eq!(calls(&gateway), 0);

        let updated = workflow
            .update_firs_fields(
                &ctx,
                id,
                FirsFields::new(crate::InvoiceTypeCode::CreditNote).with_previous_irn("INV0000-94019CE5-20250101"),
            )
            .await
            .unwrap();
        assert_eq!(updated.firs_invoice_type_code, Some(crate::InvoiceTypeCode::CreditNote));
    }

    #[tokio::test]
    async fn classification_targets_a_known_line() {
        let draft = invoice(FirsStatus::Pending);
        let id = draft.id;
        let item_id = draft.items[0].id;
        let (workflow, _gateway, ctx) = setup(draft);

        let err = workflow
            .update_line_classification(&ctx, id, LineItemId::new(), "8471.30")
            .await
            .unwrap_err();
        assert!(matches!(err, ComplianceError::Validation(ref v) if v.contains("item_id")));

        let updated = workflow
            .update_line_classification(&ctx, id, item_id, " 2523.29 ")
            .await
            .unwrap();
        assert_eq!(updated.items[0].classification_code.as_deref(), Some("2523.29"));
    }

    #[tokio::test]
    async fn concurrent_transition_on_the_same_invoice_is_busy() {
        let signed = invoice(FirsStatus::Signed);
        let id = signed.id;
        let (workflow, _gateway, ctx) = setup(signed);

        let _held = workflow.inflight.claim(id).unwrap();
        let err = workflow.update_payment(&ctx, id, PaymentStatus::Paid).await.unwrap_err();
        assert!(matches!(err, ComplianceError::Domain(DomainError::Busy(_))));
    }

    #[tokio::test]
    async fn viewers_cannot_sign() {
        let ready = invoice(FirsStatus::Validated);
        let id = ready.id;
        let viewer = AuthContext::new(UserId::new(), ready.tenant_id, vec![Role::CompanyUser]);
        let workflow = ComplianceWorkflow::new(Arc::new(FakeGateway::with(ready)));

        assert!(matches!(
            workflow.sign(&viewer, id).await,
            Err(ComplianceError::Unauthorized(_))
        ));
    }
}
