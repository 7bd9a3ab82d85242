use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use taxlink_compliance::{
    BusinessStatus, ComplianceGateway, ComplianceReport, FirsFields, FirsStatus, GatewayError,
    Invoice, PaymentStatus,
};
use taxlink_core::{Entity, InvoiceId, LineItemId, TenantId};

/// Compliance backend stand-in. Validation assigns an IRN, signing and
/// payment updates apply as requested. Rejections can be queued per invoice.
#[derive(Debug, Default)]
pub struct InMemoryComplianceGateway {
    invoices: RwLock<HashMap<InvoiceId, Invoice>>,
    rejections: RwLock<HashMap<InvoiceId, ComplianceReport>>,
}

impl InMemoryComplianceGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, invoice: Invoice) {
        let mut invoices = self.invoices.write().unwrap_or_else(|p| p.into_inner());
        invoices.insert(invoice.id, invoice);
    }

    /// The next validation of `id` is rejected with `report`.
    pub fn reject_next_validation(&self, id: InvoiceId, report: ComplianceReport) {
        let mut rejections = self.rejections.write().unwrap_or_else(|p| p.into_inner());
        rejections.insert(id, report);
    }

    /// FIRS acknowledgement of a signed invoice.
    pub fn approve(&self, id: InvoiceId) -> Option<Invoice> {
        let mut invoices = self.invoices.write().unwrap_or_else(|p| p.into_inner());
        let invoice = invoices.get_mut(&id)?;
        if invoice.firs_status == FirsStatus::Signed {
            invoice.firs_status = FirsStatus::Approved;
        }
        Some(invoice.clone())
    }

    fn mutate(
        &self,
        tenant_id: TenantId,
        id: InvoiceId,
        f: impl FnOnce(&mut Invoice) -> Result<(), GatewayError>,
    ) -> Result<Invoice, GatewayError> {
        let mut invoices = self.invoices.write().unwrap_or_else(|p| p.into_inner());
        let invoice = invoices
            .get_mut(&id)
            .filter(|inv| inv.owned_by(tenant_id))
            .ok_or(GatewayError::NotFound(id))?;
        f(invoice)?;
        Ok(invoice.clone())
    }
}

fn irn_for(invoice: &Invoice) -> String {
    let service_id = invoice
        .tenant_id
        .to_string()
        .chars()
        .take(8)
        .collect::<String>()
        .to_uppercase();
    format!(
        "{}-{}-{}",
        invoice.number,
        service_id,
        invoice.issue_date.format("%Y%m%d")
    )
}

#[async_trait]
impl ComplianceGateway for InMemoryComplianceGateway {
    async fn fetch(&self, tenant_id: TenantId, id: InvoiceId) -> Result<Option<Invoice>, GatewayError> {
        let invoices = self.invoices.read().unwrap_or_else(|p| p.into_inner());
        Ok(invoices
            .get(&id)
            .filter(|inv| inv.owned_by(tenant_id))
            .cloned())
    }

    async fn validate(&self, tenant_id: TenantId, id: InvoiceId) -> Result<Invoice, GatewayError> {
        let rejection = self
            .rejections
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&id);
        if let Some(report) = rejection {
            return Err(GatewayError::Rejected(report));
        }
        self.mutate(tenant_id, id, |inv| {
            inv.firs_status = FirsStatus::Validated;
            inv.firs_irn = Some(irn_for(inv));
            Ok(())
        })
    }

    async fn sign(&self, tenant_id: TenantId, id: InvoiceId) -> Result<Invoice, GatewayError> {
        self.mutate(tenant_id, id, |inv| {
            inv.firs_status = FirsStatus::Signed;
            Ok(())
        })
    }

    async fn update_payment(
        &self,
        tenant_id: TenantId,
        id: InvoiceId,
        status: PaymentStatus,
    ) -> Result<Invoice, GatewayError> {
        self.mutate(tenant_id, id, |inv| {
            inv.payment_status = status;
            if status == PaymentStatus::Paid {
                inv.business_status = BusinessStatus::Paid;
            }
            Ok(())
        })
    }

    async fn update_firs_fields(
        &self,
        tenant_id: TenantId,
        id: InvoiceId,
        fields: &FirsFields,
    ) -> Result<Invoice, GatewayError> {
        self.mutate(tenant_id, id, |inv| {
            inv.firs_invoice_type_code = Some(fields.type_code);
            inv.firs_note = fields.note.clone();
            inv.previous_invoice_irn = fields.previous_irn.clone();
            Ok(())
        })
    }

    async fn update_line_classification(
        &self,
        tenant_id: TenantId,
        id: InvoiceId,
        item_id: LineItemId,
        code: &str,
    ) -> Result<Invoice, GatewayError> {
        self.mutate(tenant_id, id, |inv| {
            let item = inv.items.iter_mut().find(|item| item.id == item_id).ok_or_else(|| {
                GatewayError::Rejected(ComplianceReport::default().error(format!("no line item {item_id}")))
            })?;
            item.classification_code = Some(code.to_string());
            Ok(())
        })
    }
}
