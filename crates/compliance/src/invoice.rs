use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use taxlink_core::{Entity, InvoiceId, LineItemId, TenantId, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Receivable,
    Payable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusinessStatus {
    Draft,
    Issued,
    Paid,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Rejected,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Rejected => "REJECTED",
        }
    }
}

impl core::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Regulatory lifecycle. Moves forward only; `Cancelled` and `Rejected` absorb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirsStatus {
    None,
    Pending,
    Validated,
    Signed,
    Approved,
    Cancelled,
    Rejected,
}

impl FirsStatus {
    pub fn is_closed(&self) -> bool {
        matches!(self, FirsStatus::Cancelled | FirsStatus::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FirsStatus::None => "none",
            FirsStatus::Pending => "pending",
            FirsStatus::Validated => "validated",
            FirsStatus::Signed => "signed",
            FirsStatus::Approved => "approved",
            FirsStatus::Cancelled => "cancelled",
            FirsStatus::Rejected => "rejected",
        }
    }
}

impl core::fmt::Display for FirsStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// UN/CEFACT document type codes accepted by FIRS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum InvoiceTypeCode {
    CommercialInvoice,
    CreditNote,
    DebitNote,
    CorrectedInvoice,
    PrepaymentInvoice,
    SelfBilledInvoice,
    FactoredInvoice,
}

impl InvoiceTypeCode {
    pub const ALL: [InvoiceTypeCode; 7] = [
        InvoiceTypeCode::CommercialInvoice,
        InvoiceTypeCode::CreditNote,
        InvoiceTypeCode::DebitNote,
        InvoiceTypeCode::CorrectedInvoice,
        InvoiceTypeCode::PrepaymentInvoice,
        InvoiceTypeCode::SelfBilledInvoice,
        InvoiceTypeCode::FactoredInvoice,
    ];

    pub fn code(&self) -> u16 {
        match self {
            InvoiceTypeCode::CommercialInvoice => 380,
            InvoiceTypeCode::CreditNote => 381,
            InvoiceTypeCode::DebitNote => 383,
            InvoiceTypeCode::CorrectedInvoice => 384,
            InvoiceTypeCode::PrepaymentInvoice => 386,
            InvoiceTypeCode::SelfBilledInvoice => 389,
            InvoiceTypeCode::FactoredInvoice => 396,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    /// Credit and debit notes amend an earlier invoice and must name its IRN.
    pub fn requires_previous_irn(&self) -> bool {
        matches!(self, InvoiceTypeCode::CreditNote | InvoiceTypeCode::DebitNote)
    }
}

impl TryFrom<u16> for InvoiceTypeCode {
    type Error = String;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| format!("unknown invoice type code {code}"))
    }
}

impl From<InvoiceTypeCode> for u16 {
    fn from(code: InvoiceTypeCode) -> Self {
        code.code()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub description: String,
    pub quantity: i64,
    /// Price in smallest currency unit (kobo).
    pub unit_price: u64,
    /// HS / service classification code.
    pub classification_code: Option<String>,
}

/// Invoice as held by the compliance backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub tenant_id: TenantId,
    pub number: String,
    pub issue_date: NaiveDate,
    pub direction: Direction,
    pub business_status: BusinessStatus,
    pub payment_status: PaymentStatus,
    pub firs_status: FirsStatus,
    pub firs_irn: Option<String>,
    pub firs_invoice_type_code: Option<InvoiceTypeCode>,
    pub firs_note: Option<String>,
    pub previous_invoice_irn: Option<String>,
    pub items: Vec<LineItem>,
}

/// Requested FIRS header fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirsFields {
    pub type_code: InvoiceTypeCode,
    pub note: Option<String>,
    pub previous_irn: Option<String>,
}

impl FirsFields {
    pub fn new(type_code: InvoiceTypeCode) -> Self {
        Self {
            type_code,
            note: None,
            previous_irn: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_previous_irn(mut self, irn: impl Into<String>) -> Self {
        self.previous_irn = Some(irn.into());
        self
    }

    /// `previous_irn` is mandatory for credit/debit notes and forbidden otherwise.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new();
        let has_previous = self
            .previous_irn
            .as_deref()
            .is_some_and(|irn| !irn.trim().is_empty());

        match (self.type_code.requires_previous_irn(), has_previous) {
            (true, false) => errors.add(
                "previous_invoice_irn",
                format!(
                    "previous invoice IRN is required for type code {}",
                    self.type_code.code()
                ),
            ),
            (false, true) => errors.add(
                "previous_invoice_irn",
                format!(
                    "previous invoice IRN is only allowed on credit and debit notes, not {}",
                    self.type_code.code()
                ),
            ),
            _ => {}
        }
        errors.into_result()
    }
}

/// Validate a line classification code: non-empty, alphanumeric and dots.
pub fn validate_classification(code: &str) -> Result<(), ValidationError> {
    let mut errors = ValidationError::new();
    let code = code.trim();
    if code.is_empty() {
        errors.add("classification_code", "classification code is required");
    } else if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '.') {
        errors.add(
            "classification_code",
            "classification code may only contain letters, digits and dots",
        );
    }
    errors.into_result()
}

/// A transition refused before any gateway call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GuardError {
    #[error("cannot {action} an invoice in FIRS status {actual}")]
    WrongStatus {
        action: &'static str,
        actual: FirsStatus,
    },
    #[error("invoice is {0} at FIRS; no further changes are accepted")]
    Closed(FirsStatus),
    #[error("invoice is cancelled")]
    BusinessCancelled,
    #[error("invoice has no IRN yet; validate it first")]
    MissingIrn,
    #[error("payment is already {0}")]
    RedundantPayment(PaymentStatus),
}

impl Invoice {
    pub fn item(&self, item_id: LineItemId) -> Option<&LineItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    fn ensure_not_cancelled(&self) -> Result<(), GuardError> {
        if self.firs_status.is_closed() {
            return Err(GuardError::Closed(self.firs_status));
        }
        if self.business_status == BusinessStatus::Cancelled {
            return Err(GuardError::BusinessCancelled);
        }
        Ok(())
    }

    pub fn ensure_can_validate(&self) -> Result<(), GuardError> {
        self.ensure_not_cancelled()?;
        match self.firs_status {
            FirsStatus::None | FirsStatus::Pending => Ok(()),
            actual => Err(GuardError::WrongStatus {
                action: "validate",
                actual,
            }),
        }
    }

    pub fn ensure_can_sign(&self) -> Result<(), GuardError> {
        self.ensure_not_cancelled()?;
        if self.firs_status != FirsStatus::Validated {
            return Err(GuardError::WrongStatus {
                action: "sign",
                actual: self.firs_status,
            });
        }
        if self.firs_irn.as_deref().is_none_or(|irn| irn.trim().is_empty()) {
            return Err(GuardError::MissingIrn);
        }
        Ok(())
    }

    /// FIRS header fields and line classifications are editable until signing.
    pub fn ensure_fields_editable(&self) -> Result<(), GuardError> {
        self.ensure_not_cancelled()?;
        match self.firs_status {
            FirsStatus::None | FirsStatus::Pending | FirsStatus::Validated => Ok(()),
            actual => Err(GuardError::WrongStatus {
                action: "edit",
                actual,
            }),
        }
    }

    /// Payment updates are accepted only on signed invoices, and never twice.
    pub fn ensure_payment_transition(&self, target: PaymentStatus) -> Result<(), GuardError> {
        self.ensure_not_cancelled()?;
        if self.firs_status != FirsStatus::Signed {
            return Err(GuardError::WrongStatus {
                action: "update payment on",
                actual: self.firs_status,
            });
        }
        let redundant = match target {
            PaymentStatus::Paid => {
                self.business_status == BusinessStatus::Paid
                    || self.payment_status == PaymentStatus::Paid
            }
            other => self.payment_status == other,
        };
        if redundant {
            return Err(GuardError::RedundantPayment(target));
        }
        Ok(())
    }

    /// Checks that need no round trip: items present and well-formed, and
    /// the type code paired correctly with the previous IRN.
    pub fn structural_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.items.is_empty() {
            errors.push("invoice has no line items".to_string());
        }
        for (idx, item) in self.items.iter().enumerate() {
            if item.quantity <= 0 {
                errors.push(format!("line {}: quantity must be positive", idx + 1));
            }
            if item.unit_price == 0 {
                errors.push(format!("line {}: unit price must be positive", idx + 1));
            }
        }
        match self.firs_invoice_type_code {
            Some(code) => {
                let fields = FirsFields {
                    type_code: code,
                    note: self.firs_note.clone(),
                    previous_irn: self.previous_invoice_irn.clone(),
                };
                if let Err(e) = fields.validate() {
                    errors.extend(e.fields().values().cloned());
                }
            }
            None => errors.push("invoice type code is not set".to_string()),
        }
        errors
    }
}

impl Entity for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}
