//! End-to-end walk-through against the in-memory collaborators: connect an
//! ERP, sync everything, push one invoice through FIRS and select an access
//! point provider. Prints a JSON report.

use std::collections::BTreeMap;

use anyhow::Context;
use chrono::{Datelike, NaiveDate, Utc};
use serde_json::json;

use taxlink_auth::{AuthContext, Role};
use taxlink_compliance::{
    BusinessStatus, Direction, FirsStatus, Invoice, InvoiceTypeCode, LineItem, PaymentStatus,
};
use taxlink_connections::{ConnectionProfile, Credentials, ErpType, ServerDetails};
use taxlink_core::{InvoiceId, LineItemId, TenantId, UserId};
use taxlink_infra::{BridgeConfig, InMemoryCollaborators, Platform};
use taxlink_observability::LogSettings;
use taxlink_sync::{SyncMode, SyncRequest};
use taxlink_vault::{AccessPointProvider, CredentialView, ProviderCode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BridgeConfig::from_env()?;
    taxlink_observability::tracing::init(&LogSettings {
        format: config.log_format,
        ..LogSettings::default()
    });

    let tenant = config.tenant_id.unwrap_or_default();
    let ctx = AuthContext::new(UserId::new(), tenant, vec![Role::CompanyAdmin]);
    let memory = InMemoryCollaborators::new();
    let platform = Platform::new(memory.collaborators(), &config);
    tracing::info!(%tenant, "simulation started");

    // Connect
    let today = Utc::now().date_naive();
    let start = NaiveDate::from_ymd_opt(today.year(), 1, 1).context("invalid start of year")?;
    let mut server = ServerDetails::new("odoo.acme.ng");
    server.database = Some("acme_prod".to_string());
    let draft = ConnectionProfile::draft(tenant, ErpType::Odoo, server, start)
        .with_api_credentials(Credentials::new("integration", "s3cret-pass"));
    let saved = platform
        .connections
        .create(&ctx, draft)
        .await
        .context("creating the connection profile")?;
    let profile_id = saved
        .profile
        .id
        .context("stored profile came back without an id")?;

    // Sync
    let run = platform
        .sync_and_wait(&ctx, profile_id, SyncRequest::all(SyncMode::Full))
        .await
        .context("running the full sync")?;

    // Comply
    let invoice = seed_invoice(tenant, today);
    let invoice_id = invoice.id;
    memory.gateway.insert(invoice);
    let item_id = first_item(&platform, &ctx, invoice_id).await?;
    platform
        .compliance
        .update_line_classification(&ctx, invoice_id, item_id, "2523.29")
        .await
        .context("classifying the invoice line")?;
    let validated = platform.compliance.validate(&ctx, invoice_id).await?;
    platform.compliance.sign(&ctx, invoice_id).await?;
    let paid = platform
        .compliance
        .update_payment(&ctx, invoice_id, PaymentStatus::Paid)
        .await?;

    // Relay
    let provider = AccessPointProvider::new(tenant, ProviderCode::Etranzact, "eTranzact");
    let provider_id = provider.id;
    memory.providers.register(provider);
    let credentials = BTreeMap::from([
        ("participant_id".to_string(), "ACME-001".to_string()),
        ("api_key".to_string(), "etz_live_7c41d2a9f0".to_string()),
    ]);
    let active = platform.vault.activate(&ctx, provider_id, Some(credentials)).await?;
    let masked = platform
        .vault
        .active_credentials(&ctx, CredentialView::Masked)
        .await?;

    let report = json!({
        "tenant_id": tenant,
        "profile": saved.profile,
        "adjustments": saved.adjustments,
        "sync": run,
        "invoice": {
            "irn": validated.firs_irn,
            "final": paid,
        },
        "access_point": {
            "provider": active,
            "credentials": masked,
        },
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn first_item(platform: &Platform, ctx: &AuthContext, id: InvoiceId) -> anyhow::Result<LineItemId> {
    let invoice = platform.compliance.get(ctx, id).await?;
    invoice
        .items
        .first()
        .map(|item| item.id)
        .context("seeded invoice has no lines")
}

fn seed_invoice(tenant_id: TenantId, issue_date: NaiveDate) -> Invoice {
    Invoice {
        id: InvoiceId::new(),
        tenant_id,
        number: "INV-2025-0001".to_string(),
        issue_date,
        direction: Direction::Receivable,
        business_status: BusinessStatus::Issued,
        payment_status: PaymentStatus::Pending,
        firs_status: FirsStatus::Pending,
        firs_irn: None,
        firs_invoice_type_code: Some(InvoiceTypeCode::CommercialInvoice),
        firs_note: None,
        previous_invoice_irn: None,
        items: vec![LineItem {
            id: LineItemId::new(),
            description: "Portland cement, 50kg".to_string(),
            quantity: 40,
            unit_price: 950_000,
            classification_code: None,
        }],
    }
}
