//! Notification dispatch
//!
//! Every workflow event maps to a fixed recipient list (from the approval
//! rules) and a Russian message template. The dispatcher keeps an in-app
//! copy per recipient and hands the text to a messaging transport. Delivery
//! is best effort: failures are logged, never retried.

pub mod telegram;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::EntityKind;
use crate::rules::ApprovalRules;
use crate::store::{self, Store};

pub use telegram::TelegramTransport;

/// Workflow events that produce notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    RequestCreated,
    RequestApproved,
    TenderCreated,
    OfferSubmitted,
    TenderCompleted,
    TenderCancelled,
    ProtocolCreated,
    ProtocolReady,
    FinanceSubmitted,
    ProtocolPaid,
}

impl NotificationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationEvent::RequestCreated => "request_created",
            NotificationEvent::RequestApproved => "request_approved",
            NotificationEvent::TenderCreated => "tender_created",
            NotificationEvent::OfferSubmitted => "offer_submitted",
            NotificationEvent::TenderCompleted => "tender_completed",
            NotificationEvent::TenderCancelled => "tender_cancelled",
            NotificationEvent::ProtocolCreated => "protocol_created",
            NotificationEvent::ProtocolReady => "protocol_ready",
            NotificationEvent::FinanceSubmitted => "finance_submitted",
            NotificationEvent::ProtocolPaid => "protocol_paid",
        }
    }

    pub fn all() -> [NotificationEvent; 10] {
        [
            NotificationEvent::RequestCreated,
            NotificationEvent::RequestApproved,
            NotificationEvent::TenderCreated,
            NotificationEvent::OfferSubmitted,
            NotificationEvent::TenderCompleted,
            NotificationEvent::TenderCancelled,
            NotificationEvent::ProtocolCreated,
            NotificationEvent::ProtocolReady,
            NotificationEvent::FinanceSubmitted,
            NotificationEvent::ProtocolPaid,
        ]
    }
}

impl std::str::FromStr for NotificationEvent {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        NotificationEvent::all()
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| format!("Invalid notification event: {}", s))
    }
}

/// A single event occurrence to be announced
#[derive(Debug, Clone)]
pub struct Notice {
    pub event: NotificationEvent,
    pub entity_kind: EntityKind,
    pub entity_id: Uuid,
    /// Title of the request, tender or protocol
    pub title: String,
    /// Event specific detail: winner name, protocol number, offer summary
    pub detail: Option<String>,
    /// Users left out of the recipient list
    pub skip: Vec<Uuid>,
}

impl Notice {
    pub fn new(
        event: NotificationEvent,
        entity_kind: EntityKind,
        entity_id: Uuid,
        title: impl Into<String>,
    ) -> Self {
        Self {
            event,
            entity_kind,
            entity_id,
            title: title.into(),
            detail: None,
            skip: Vec::new(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Leave these users out, e.g. signers who have already signed
    pub fn skipping(mut self, users: &[Uuid]) -> Self {
        self.skip.extend_from_slice(users);
        self
    }

    /// Render the user-facing message
    pub fn render(&self) -> String {
        let title = &self.title;
        let detail = self.detail.as_deref().unwrap_or("—");
        match self.event {
            NotificationEvent::RequestCreated => {
                format!("📝 Новая заявка «{}» ожидает вашей подписи.", title)
            }
            NotificationEvent::RequestApproved => {
                format!("✅ Заявка «{}» подписана всеми согласующими.", title)
            }
            NotificationEvent::TenderCreated => format!("📢 Открыт тендер «{}».", title),
            NotificationEvent::OfferSubmitted => {
                format!("💼 Новое предложение по тендеру «{}»: {}.", title, detail)
            }
            NotificationEvent::TenderCompleted => {
                format!("🏆 Тендер «{}» завершён. Победитель: {}.", title, detail)
            }
            NotificationEvent::TenderCancelled => format!("❌ Тендер «{}» отменён.", title),
            NotificationEvent::ProtocolCreated => {
                format!("📄 Протокол «{}» ожидает вашей подписи.", title)
            }
            NotificationEvent::ProtocolReady => format!(
                "🖋 Протокол «{}» подписан и готов к присвоению номера.",
                title
            ),
            NotificationEvent::FinanceSubmitted => format!(
                "💰 Протокол № {} «{}» передан в финансовый отдел.",
                detail, title
            ),
            NotificationEvent::ProtocolPaid => format!(
                "✔️ Протокол № {} «{}» оплачен и перемещён в архив.",
                detail, title
            ),
        }
    }
}

/// Outbound messaging channel
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()>;
}

/// Transport that only logs, used when no bot token is configured
pub struct LogTransport;

#[async_trait]
impl MessageTransport for LogTransport {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        tracing::info!(chat_id, "notification (not delivered): {}", text);
        Ok(())
    }
}

/// What happened to one dispatched notice
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub recipients: Vec<Uuid>,
    pub stored: usize,
    pub delivered: usize,
    /// Recipients without a known Telegram chat
    pub unreachable: usize,
    pub failed: usize,
}

pub struct NotificationDispatcher {
    store: Store,
    rules: Arc<ApprovalRules>,
    transport: Arc<dyn MessageTransport>,
}

impl NotificationDispatcher {
    pub fn new(store: Store, rules: Arc<ApprovalRules>, transport: Arc<dyn MessageTransport>) -> Self {
        Self {
            store,
            rules,
            transport,
        }
    }

    pub async fn dispatch(&self, notice: &Notice) -> DispatchReport {
        let recipients: Vec<Uuid> = self
            .rules
            .recipients_for(notice.event)
            .into_iter()
            .filter(|id| !notice.skip.contains(id))
            .collect();
        let message = notice.render();
        let mut report = DispatchReport {
            recipients: recipients.clone(),
            ..DispatchReport::default()
        };

        let mut conn = match self.store.conn().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(event = notice.event.as_str(), "notification skipped: {}", e);
                report.failed = recipients.len();
                return report;
            }
        };

        for recipient in recipients {
            match store::notifications::insert(
                &mut conn,
                recipient,
                notice.event.as_str(),
                &message,
                notice.entity_kind,
                notice.entity_id,
            )
            .await
            {
                Ok(_) => report.stored += 1,
                Err(e) => tracing::warn!(%recipient, "failed to store notification: {}", e),
            }

            let chat_id = match store::users::find(&mut conn, recipient).await {
                Ok(Some(user)) => user.telegram_chat_id,
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(%recipient, "failed to look up recipient: {}", e);
                    None
                }
            };
            let Some(chat_id) = chat_id else {
                report.unreachable += 1;
                continue;
            };

            match self.transport.send(chat_id, &message).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        %recipient,
                        event = notice.event.as_str(),
                        "notification delivery failed: {}",
                        e
                    );
                }
            }
        }

        tracing::debug!(
            event = notice.event.as_str(),
            delivered = report.delivered,
            failed = report.failed,
            "notification dispatched"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::UpsertUser;
    use crate::rules::{CHIEF_ACCOUNTANT, DIRECTOR, PROCUREMENT_HEAD};
    use crate::store::test_support::setup_test_db;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(i64, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl MessageTransport for RecordingTransport {
        async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
            if self.fail {
                return Err(AppError::Notify("boom".into()));
            }
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }
    }

    #[test]
    fn test_event_strings_round_trip() {
        for event in NotificationEvent::all() {
            assert_eq!(event.as_str().parse::<NotificationEvent>().unwrap(), event);
            let json = serde_json::to_string(&event).unwrap();
            assert_eq!(json, format!("\"{}\"", event.as_str()));
        }
        assert!("request_deleted".parse::<NotificationEvent>().is_err());
    }

    #[test]
    fn test_render_templates() {
        let id = Uuid::new_v4();
        let notice = Notice::new(NotificationEvent::TenderCompleted, EntityKind::Tender, id, "Стулья")
            .with_detail("ООО Ромашка");
        assert_eq!(
            notice.render(),
            "🏆 Тендер «Стулья» завершён. Победитель: ООО Ромашка."
        );

        let notice = Notice::new(NotificationEvent::ProtocolPaid, EntityKind::Protocol, id, "Стулья")
            .with_detail("2026/004");
        assert!(notice.render().contains("№ 2026/004"));

        let notice = Notice::new(NotificationEvent::OfferSubmitted, EntityKind::Tender, id, "Стулья");
        assert!(notice.render().ends_with("«Стулья»: —."));
    }

    #[test]
    fn test_every_event_has_a_message() {
        for event in NotificationEvent::all() {
            let notice = Notice::new(event, EntityKind::Request, Uuid::new_v4(), "X");
            assert!(notice.render().contains("«X»"));
        }
    }

    #[tokio::test]
    async fn test_dispatch_stores_and_delivers() {
        let store = setup_test_db().await;
        {
            let mut conn = store.conn().await.unwrap();
            store::users::upsert(
                &mut conn,
                DIRECTOR,
                &UpsertUser {
                    full_name: "Director".into(),
                    telegram_chat_id: Some(1001),
                },
            )
            .await
            .unwrap();
        }
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = NotificationDispatcher::new(
            store.clone(),
            Arc::new(ApprovalRules::default()),
            transport.clone(),
        );

        let notice = Notice::new(
            NotificationEvent::ProtocolCreated,
            EntityKind::Protocol,
            Uuid::new_v4(),
            "Chairs",
        );
        let report = dispatcher.dispatch(&notice).await;

        assert_eq!(report.recipients.len(), 4);
        assert_eq!(report.stored, 4);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.unreachable, 3);
        assert_eq!(transport.sent.lock().unwrap()[0].0, 1001);

        let mut conn = store.conn().await.unwrap();
        let inbox = store::notifications::list_for(&mut conn, CHIEF_ACCOUNTANT, false)
            .await
            .unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].event, "protocol_created");
    }

    #[tokio::test]
    async fn test_dispatch_skips_listed_users() {
        let store = setup_test_db().await;
        {
            let mut conn = store.conn().await.unwrap();
            store::users::upsert(
                &mut conn,
                DIRECTOR,
                &UpsertUser {
                    full_name: "Director".into(),
                    telegram_chat_id: Some(1001),
                },
            )
            .await
            .unwrap();
        }
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = NotificationDispatcher::new(
            store.clone(),
            Arc::new(ApprovalRules::default()),
            transport.clone(),
        );

        let notice = Notice::new(
            NotificationEvent::ProtocolCreated,
            EntityKind::Protocol,
            Uuid::new_v4(),
            "Chairs",
        )
        .skipping(&[DIRECTOR]);
        let report = dispatcher.dispatch(&notice).await;

        assert_eq!(report.recipients.len(), 3);
        assert!(!report.recipients.contains(&DIRECTOR));
        assert_eq!(report.delivered, 0);
        assert!(transport.sent.lock().unwrap().is_empty());

        let mut conn = store.conn().await.unwrap();
        let inbox = store::notifications::list_for(&mut conn, DIRECTOR, false)
            .await
            .unwrap();
        assert!(inbox.is_empty());
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let store = setup_test_db().await;
        {
            let mut conn = store.conn().await.unwrap();
            store::users::upsert(
                &mut conn,
                PROCUREMENT_HEAD,
                &UpsertUser {
                    full_name: "Head".into(),
                    telegram_chat_id: Some(7),
                },
            )
            .await
            .unwrap();
        }
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..Default::default()
        });
        let dispatcher =
            NotificationDispatcher::new(store.clone(), Arc::new(ApprovalRules::default()), transport);

        let notice = Notice::new(
            NotificationEvent::TenderCreated,
            EntityKind::Tender,
            Uuid::new_v4(),
            "Chairs",
        );
        let report = dispatcher.dispatch(&notice).await;
        assert_eq!(report.recipients, vec![PROCUREMENT_HEAD]);
        assert_eq!(report.stored, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 0);
    }
}
