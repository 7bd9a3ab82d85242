//! FIRS e-invoice compliance workflow.
//!
//! Invoices live in the compliance backend; this crate holds the guards for
//! each regulatory transition and the workflow that applies them against the
//! latest backend state.

pub mod invoice;
pub mod report;
pub mod workflow;

pub use invoice::{
    BusinessStatus, Direction, FirsFields, FirsStatus, GuardError, Invoice, InvoiceTypeCode,
    LineItem, PaymentStatus, validate_classification,
};
pub use report::ComplianceReport;
pub use workflow::{ComplianceError, ComplianceGateway, ComplianceWorkflow, GatewayError};
