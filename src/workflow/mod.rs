//! Procurement workflow engine
//!
//! The engine owns every stage transition:
//! - request signing and the tender / cash protocol it spawns
//! - supplier offers and winner selection
//! - protocol signing, numbering, finance submission and payment
//! - archiving with a generated document bundle
//!
//! Each operation runs in one database transaction. Notifications and
//! realtime events are collected while the transaction runs and published
//! only after it commits.

mod protocols;
mod requests;
mod tenders;

pub use protocols::{PaymentOutcome, ProtocolSignOutcome};
pub use requests::RequestSignOutcome;
pub use tenders::WinnerOutcome;

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::SqliteConnection;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    ArchivedProtocol, AuditEntry, CalendarEvent, EntityKind, FinanceStatus, Notification,
    Protocol, ProtocolStatus, Request, RequestStatus, Task, TaskStatus, Tender, TenderStatus,
    UpsertUser, User,
};
use crate::notify::{MessageTransport, Notice, NotificationDispatcher};
use crate::rules::ApprovalRules;
use crate::store::{self, Store};

/// Realtime events pushed to subscribed clients so they can refetch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    RequestCreated {
        request_id: Uuid,
    },
    RequestSigned {
        request_id: Uuid,
        user_id: Uuid,
        quorum_complete: bool,
    },
    RequestStatusChanged {
        request_id: Uuid,
        status: RequestStatus,
    },
    TenderCreated {
        tender_id: Uuid,
        request_id: Uuid,
    },
    SupplierChanged {
        tender_id: Uuid,
        supplier_id: Uuid,
    },
    TenderStatusChanged {
        tender_id: Uuid,
        status: TenderStatus,
    },
    ProtocolCreated {
        protocol_id: Uuid,
    },
    ProtocolSigned {
        protocol_id: Uuid,
        user_id: Uuid,
        quorum_complete: bool,
    },
    ProtocolStatusChanged {
        protocol_id: Uuid,
        status: ProtocolStatus,
        finance_status: FinanceStatus,
    },
    ProtocolArchived {
        protocol_id: Uuid,
        archive_id: Uuid,
    },
}

impl WorkflowEvent {
    /// The entity type a client should refetch
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            WorkflowEvent::RequestCreated { .. }
            | WorkflowEvent::RequestSigned { .. }
            | WorkflowEvent::RequestStatusChanged { .. } => EntityKind::Request,
            WorkflowEvent::TenderCreated { .. } | WorkflowEvent::TenderStatusChanged { .. } => {
                EntityKind::Tender
            }
            WorkflowEvent::SupplierChanged { .. } => EntityKind::Supplier,
            WorkflowEvent::ProtocolCreated { .. }
            | WorkflowEvent::ProtocolSigned { .. }
            | WorkflowEvent::ProtocolStatusChanged { .. } => EntityKind::Protocol,
            WorkflowEvent::ProtocolArchived { .. } => EntityKind::ArchivedProtocol,
        }
    }
}

/// Side effects gathered during a transaction
#[derive(Debug, Default)]
pub(crate) struct Effects {
    notices: Vec<Notice>,
    events: Vec<WorkflowEvent>,
}

impl Effects {
    pub(crate) fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    pub(crate) fn emit(&mut self, event: WorkflowEvent) {
        self.events.push(event);
    }
}

/// Stage transitions and queries over the procurement pipeline
pub struct WorkflowEngine {
    store: Store,
    rules: Arc<ApprovalRules>,
    dispatcher: NotificationDispatcher,
    event_tx: broadcast::Sender<WorkflowEvent>,
}

impl WorkflowEngine {
    pub fn new(store: Store, rules: ApprovalRules, transport: Arc<dyn MessageTransport>) -> Self {
        let rules = Arc::new(rules);
        let (event_tx, _) = broadcast::channel(256);
        Self {
            dispatcher: NotificationDispatcher::new(store.clone(), rules.clone(), transport),
            store,
            rules,
            event_tx,
        }
    }

    pub fn rules(&self) -> &ApprovalRules {
        &self.rules
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Subscribe to realtime workflow events
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.event_tx.subscribe()
    }

    /// Deliver collected effects once the transaction has committed
    async fn publish(&self, effects: Effects) {
        for notice in &effects.notices {
            self.dispatcher.dispatch(notice).await;
        }
        for event in effects.events {
            // No subscribers is fine
            let _ = self.event_tx.send(event);
        }
    }

    /// Open one "please sign" task per signer who has not signed yet
    async fn open_sign_tasks(
        conn: &mut SqliteConnection,
        signers: &[Uuid],
        already_signed: &[Uuid],
        title: &str,
        kind: EntityKind,
        entity_id: Uuid,
    ) -> Result<()> {
        for signer in signers.iter().filter(|s| !already_signed.contains(s)) {
            store::tasks::insert(conn, *signer, title, kind, entity_id).await?;
        }
        Ok(())
    }

    // Queries

    pub async fn list_requests(&self, status: Option<RequestStatus>) -> Result<Vec<Request>> {
        let mut conn = self.store.conn().await?;
        store::requests::list(&mut conn, status).await
    }

    pub async fn get_request(&self, id: Uuid) -> Result<Request> {
        let mut conn = self.store.conn().await?;
        store::requests::get(&mut conn, id).await
    }

    pub async fn list_tenders(&self, status: Option<TenderStatus>) -> Result<Vec<Tender>> {
        let mut conn = self.store.conn().await?;
        store::tenders::list(&mut conn, status).await
    }

    pub async fn get_tender(&self, id: Uuid) -> Result<Tender> {
        let mut conn = self.store.conn().await?;
        store::tenders::get(&mut conn, id).await
    }

    pub async fn list_protocols(
        &self,
        finance_status: Option<FinanceStatus>,
    ) -> Result<Vec<Protocol>> {
        let mut conn = self.store.conn().await?;
        store::protocols::list(&mut conn, finance_status).await
    }

    pub async fn get_protocol(&self, id: Uuid) -> Result<Protocol> {
        let mut conn = self.store.conn().await?;
        store::protocols::get(&mut conn, id).await
    }

    pub async fn list_archive(&self) -> Result<Vec<ArchivedProtocol>> {
        let mut conn = self.store.conn().await?;
        store::archive::list(&mut conn).await
    }

    pub async fn get_archived(&self, id: Uuid) -> Result<ArchivedProtocol> {
        let mut conn = self.store.conn().await?;
        store::archive::get(&mut conn, id).await
    }

    pub async fn list_calendar(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<CalendarEvent>> {
        let mut conn = self.store.conn().await?;
        store::calendar::list(&mut conn, from, to).await
    }

    pub async fn list_tasks(&self, user: Uuid, status: Option<TaskStatus>) -> Result<Vec<Task>> {
        let mut conn = self.store.conn().await?;
        store::tasks::list_for(&mut conn, user, status).await
    }

    pub async fn list_notifications(&self, user: Uuid, unread_only: bool) -> Result<Vec<Notification>> {
        let mut conn = self.store.conn().await?;
        store::notifications::list_for(&mut conn, user, unread_only).await
    }

    pub async fn mark_notification_read(&self, user: Uuid, id: Uuid) -> Result<()> {
        let mut conn = self.store.conn().await?;
        store::notifications::mark_read(&mut conn, user, id).await
    }

    pub async fn audit_log(&self, kind: EntityKind, id: Uuid) -> Result<Vec<AuditEntry>> {
        let mut conn = self.store.conn().await?;
        store::audit::list_for(&mut conn, kind, id).await
    }

    pub async fn upsert_user(&self, id: Uuid, input: UpsertUser) -> Result<User> {
        let mut conn = self.store.conn().await?;
        store::users::upsert(&mut conn, id, &input).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let mut conn = self.store.conn().await?;
        store::users::list(&mut conn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_entity_kind() {
        let id = Uuid::new_v4();
        assert_eq!(
            WorkflowEvent::RequestCreated { request_id: id }.entity_kind(),
            EntityKind::Request
        );
        assert_eq!(
            WorkflowEvent::SupplierChanged {
                tender_id: id,
                supplier_id: id
            }
            .entity_kind(),
            EntityKind::Supplier
        );
        assert_eq!(
            WorkflowEvent::ProtocolArchived {
                protocol_id: id,
                archive_id: id
            }
            .entity_kind(),
            EntityKind::ArchivedProtocol
        );
    }

    #[test]
    fn test_event_serialization() {
        let id = Uuid::nil();
        let json = serde_json::to_value(WorkflowEvent::ProtocolStatusChanged {
            protocol_id: id,
            status: ProtocolStatus::ReadyToNumber,
            finance_status: FinanceStatus::NotSubmitted,
        })
        .unwrap();
        assert_eq!(json["type"], "protocol_status_changed");
        assert_eq!(json["status"], "ready_to_number");
        assert_eq!(json["finance_status"], "not_submitted");
    }
}
