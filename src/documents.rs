//! Document bundle generated when a protocol is archived

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::models::{ArchivedDocument, Protocol, ProtocolKind, User};

/// Render the printable protocol and a machine-readable summary.
///
/// `signers` resolves signature user ids to names where the directory knows them.
pub fn render_bundle(protocol: &Protocol, number: &str, signers: &[User]) -> Vec<ArchivedDocument> {
    vec![
        ArchivedDocument {
            name: format!("protocol-{}.txt", number.replace('/', "-")),
            mime_type: "text/plain; charset=utf-8".to_string(),
            content: render_protocol_text(protocol, number, signers),
        },
        ArchivedDocument {
            name: "summary.json".to_string(),
            mime_type: "application/json".to_string(),
            content: render_summary(protocol, number).to_string(),
        },
    ]
}

fn render_protocol_text(protocol: &Protocol, number: &str, signers: &[User]) -> String {
    let mut out = String::new();
    let heading = match protocol.kind {
        ProtocolKind::Tender => "ПРОТОКОЛ ПОДВЕДЕНИЯ ИТОГОВ ТЕНДЕРА",
        ProtocolKind::Cash => "ПРОТОКОЛ ЗАКУПКИ ЗА НАЛИЧНЫЙ РАСЧЁТ",
    };

    out.push_str(&format!("{} № {}\n\n", heading, number));
    out.push_str(&format!("Предмет закупки: {}\n", protocol.title));
    if let Some(supplier) = &protocol.supplier_name {
        out.push_str(&format!("Поставщик: {}\n", supplier));
    }
    out.push_str(&format!("Сумма: {:.2} руб.\n", protocol.amount));
    out.push_str(&format!("Дата создания: {}\n", format_date(protocol.created_at)));
    if let Some(paid_at) = protocol.paid_at {
        out.push_str(&format!("Дата оплаты: {}\n", format_date(paid_at)));
    }

    out.push_str("\nПодписи:\n");
    for sig in &protocol.signatures {
        let name = signers
            .iter()
            .find(|u| u.id == sig.user_id)
            .map(|u| u.full_name.clone())
            .unwrap_or_else(|| sig.user_id.to_string());
        out.push_str(&format!("  {} — {}\n", name, format_date(sig.signed_at)));
    }
    out
}

fn render_summary(protocol: &Protocol, number: &str) -> serde_json::Value {
    json!({
        "protocol_id": protocol.id,
        "number": number,
        "kind": protocol.kind,
        "title": protocol.title,
        "supplier": protocol.supplier_name,
        "amount": protocol.amount,
        "request_id": protocol.request_id,
        "tender_id": protocol.tender_id,
        "signed_by": protocol.signatures.iter().map(|s| s.user_id).collect::<Vec<_>>(),
        "paid_at": protocol.paid_at,
    })
}

fn format_date(at: DateTime<Utc>) -> String {
    at.format("%d.%m.%Y").to_string()
}
