//! Request creation, signing and the stage it hands off to

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::{Effects, WorkflowEngine, WorkflowEvent};
use crate::error::{AppError, Result};
use crate::models::{
    EntityKind, NewRequest, Protocol, ProtocolKind, Request, RequestKind, RequestStatus, Tender,
};
use crate::notify::{Notice, NotificationEvent};
use crate::quorum::{self, QuorumStatus};
use crate::store::{self, protocols::ProtocolDraft};

/// Result of a request signature
#[derive(Debug, Clone, Serialize)]
pub struct RequestSignOutcome {
    pub request: Request,
    /// False when the actor had already signed
    pub newly_signed: bool,
    pub quorum: QuorumStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tender: Option<Tender>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
}

fn validate(input: &NewRequest) -> Result<()> {
    if input.title.trim().is_empty() {
        return Err(AppError::BadRequest("Укажите название заявки".to_string()));
    }
    if input.items.is_empty() {
        return Err(AppError::BadRequest(
            "Заявка должна содержать хотя бы одну позицию".to_string(),
        ));
    }
    for item in &input.items {
        if item.name.trim().is_empty() {
            return Err(AppError::BadRequest("Укажите наименование позиции".to_string()));
        }
        if item.quantity <= 0.0 {
            return Err(AppError::BadRequest(format!(
                "Количество для «{}» должно быть больше нуля",
                item.name
            )));
        }
        if item.estimated_price.is_some_and(|p| p < 0.0) {
            return Err(AppError::BadRequest(format!(
                "Цена для «{}» не может быть отрицательной",
                item.name
            )));
        }
    }
    Ok(())
}

impl WorkflowEngine {
    /// Create a draft request and ask the request signers to sign it
    pub async fn create_request(&self, actor: Uuid, input: NewRequest) -> Result<Request> {
        validate(&input)?;

        let mut effects = Effects::default();
        let mut tx = self.store.begin().await?;

        let request = store::requests::insert(&mut tx, &input, actor).await?;
        store::audit::record(
            &mut tx,
            EntityKind::Request,
            request.id,
            None,
            RequestStatus::Draft.as_str(),
            Some(actor),
        )
        .await?;
        Self::open_sign_tasks(
            &mut tx,
            self.rules.required_signers(EntityKind::Request),
            &[],
            &format!("Подписать заявку «{}»", request.title),
            EntityKind::Request,
            request.id,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(request_id = %request.id, kind = request.kind.as_str(), "request created");
        effects.notify(Notice::new(
            NotificationEvent::RequestCreated,
            EntityKind::Request,
            request.id,
            &request.title,
        ));
        effects.emit(WorkflowEvent::RequestCreated {
            request_id: request.id,
        });
        self.publish(effects).await;

        Ok(request)
    }

    /// Add the actor's signature; on a complete quorum hand the request to
    /// the tender stage (transfer) or straight to a protocol (cash)
    pub async fn sign_request(&self, actor: Uuid, id: Uuid) -> Result<RequestSignOutcome> {
        if !self.rules.is_request_signer(actor) {
            return Err(AppError::Forbidden(
                "Вы не входите в список согласующих заявки".to_string(),
            ));
        }

        let mut effects = Effects::default();
        let mut tx = self.store.begin().await?;
        let request = store::requests::get(&mut tx, id).await?;

        let already_signed = request.signatures.iter().any(|s| s.user_id == actor);
        if !already_signed && request.status != RequestStatus::Draft {
            return Err(AppError::Conflict(format!(
                "Заявка не ожидает подписи (статус: {})",
                request.status.as_str()
            )));
        }

        let newly_signed =
            store::signatures::insert(&mut tx, EntityKind::Request, id, actor, Utc::now()).await?;
        if newly_signed {
            store::tasks::complete_for(&mut tx, actor, EntityKind::Request, id).await?;
        }

        let set = store::signatures::load_set(&mut tx, EntityKind::Request, id).await?;
        let quorum = quorum::check(&set, self.rules.required_signers(EntityKind::Request));

        let mut tender = None;
        let mut protocol = None;
        // Only the signer whose update flips the status runs the hand-off
        if quorum.is_complete()
            && store::requests::transition(&mut tx, id, RequestStatus::Draft, RequestStatus::Signed)
                .await?
        {
            store::audit::record(
                &mut tx,
                EntityKind::Request,
                id,
                Some(RequestStatus::Draft.as_str()),
                RequestStatus::Signed.as_str(),
                Some(actor),
            )
            .await?;
            effects.notify(Notice::new(
                NotificationEvent::RequestApproved,
                EntityKind::Request,
                id,
                &request.title,
            ));

            match request.kind {
                RequestKind::Transfer => {
                    tender = Some(self.open_tender(&mut tx, &request, actor, &mut effects).await?);
                }
                RequestKind::Cash => {
                    protocol = Some(self.open_cash_protocol(&mut tx, &request, actor, &mut effects).await?);
                }
            }
        }

        let request = store::requests::get(&mut tx, id).await?;
        tx.commit().await?;

        if newly_signed {
            tracing::info!(
                request_id = %id,
                signer = %actor,
                collected = quorum.collected,
                required = quorum.required,
                "request signed"
            );
            effects.emit(WorkflowEvent::RequestSigned {
                request_id: id,
                user_id: actor,
                quorum_complete: quorum.is_complete(),
            });
        }
        if tender.is_some() || protocol.is_some() {
            effects.emit(WorkflowEvent::RequestStatusChanged {
                request_id: id,
                status: request.status,
            });
        }
        self.publish(effects).await;

        Ok(RequestSignOutcome {
            request,
            newly_signed,
            quorum,
            tender,
            protocol,
        })
    }

    /// Withdraw a draft request. Only its author may do this.
    pub async fn cancel_request(&self, actor: Uuid, id: Uuid) -> Result<Request> {
        let mut effects = Effects::default();
        let mut tx = self.store.begin().await?;
        let request = store::requests::get(&mut tx, id).await?;

        if request.created_by != actor {
            return Err(AppError::Forbidden(
                "Отменить заявку может только её автор".to_string(),
            ));
        }
        if !store::requests::transition(&mut tx, id, RequestStatus::Draft, RequestStatus::Cancelled)
            .await?
        {
            return Err(AppError::Conflict(
                "Отменить можно только заявку в статусе черновика".to_string(),
            ));
        }

        store::tasks::complete_all_for(&mut tx, EntityKind::Request, id).await?;
        store::audit::record(
            &mut tx,
            EntityKind::Request,
            id,
            Some(RequestStatus::Draft.as_str()),
            RequestStatus::Cancelled.as_str(),
            Some(actor),
        )
        .await?;
        let request = store::requests::get(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(request_id = %id, "request cancelled");
        effects.emit(WorkflowEvent::RequestStatusChanged {
            request_id: id,
            status: request.status,
        });
        self.publish(effects).await;

        Ok(request)
    }

    async fn open_tender(
        &self,
        conn: &mut sqlx::SqliteConnection,
        request: &Request,
        actor: Uuid,
        effects: &mut Effects,
    ) -> Result<Tender> {
        let tender = store::tenders::insert_from_request(conn, request).await?;
        store::requests::transition(conn, request.id, RequestStatus::Signed, RequestStatus::InTender)
            .await?;
        store::audit::record(
            conn,
            EntityKind::Request,
            request.id,
            Some(RequestStatus::Signed.as_str()),
            RequestStatus::InTender.as_str(),
            Some(actor),
        )
        .await?;
        store::audit::record(
            conn,
            EntityKind::Tender,
            tender.id,
            None,
            tender.status.as_str(),
            Some(actor),
        )
        .await?;

        tracing::info!(request_id = %request.id, tender_id = %tender.id, "tender opened");
        effects.notify(Notice::new(
            NotificationEvent::TenderCreated,
            EntityKind::Tender,
            tender.id,
            &tender.title,
        ));
        effects.emit(WorkflowEvent::TenderCreated {
            tender_id: tender.id,
            request_id: request.id,
        });
        Ok(tender)
    }

    async fn open_cash_protocol(
        &self,
        conn: &mut sqlx::SqliteConnection,
        request: &Request,
        actor: Uuid,
        effects: &mut Effects,
    ) -> Result<Protocol> {
        let draft = ProtocolDraft {
            kind: ProtocolKind::Cash,
            tender_id: None,
            request_id: request.id,
            title: request.title.clone(),
            supplier_name: None,
            amount: request.estimated_total(),
        };
        let protocol = self.open_protocol(conn, draft, None, actor, effects).await?;

        store::requests::transition(conn, request.id, RequestStatus::Signed, RequestStatus::InProtocol)
            .await?;
        store::audit::record(
            conn,
            EntityKind::Request,
            request.id,
            Some(RequestStatus::Signed.as_str()),
            RequestStatus::InProtocol.as_str(),
            Some(actor),
        )
        .await?;
        Ok(protocol)
    }
}
