//! Protocol signing, numbering, finance hand-off and archiving

use chrono::{Datelike, Duration, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::{Effects, WorkflowEngine, WorkflowEvent};
use crate::documents;
use crate::error::{AppError, Result};
use crate::models::{
    ArchivedProtocol, CalendarEvent, EntityKind, FinanceStatus, Protocol, ProtocolStatus,
};
use crate::notify::{Notice, NotificationEvent};
use crate::quorum::{self, QuorumStatus, SignatureSet};
use crate::store::{self, protocols::ProtocolDraft};

/// Result of a protocol signature
#[derive(Debug, Clone, Serialize)]
pub struct ProtocolSignOutcome {
    pub protocol: Protocol,
    pub newly_signed: bool,
    pub quorum: QuorumStatus,
}

/// Everything produced when a protocol is paid
#[derive(Debug, Clone, Serialize)]
pub struct PaymentOutcome {
    pub protocol: Protocol,
    pub archive: ArchivedProtocol,
    pub calendar_event: CalendarEvent,
}

fn finance_key(status: FinanceStatus) -> String {
    format!("finance:{}", status.as_str())
}

impl WorkflowEngine {
    /// Insert a protocol in `signing`, apply the optional automatic signature
    /// and open sign tasks for the rest of the protocol signers
    pub(super) async fn open_protocol(
        &self,
        conn: &mut SqliteConnection,
        draft: ProtocolDraft,
        auto_signer: Option<Uuid>,
        actor: Uuid,
        effects: &mut Effects,
    ) -> Result<Protocol> {
        let protocol = store::protocols::insert(conn, draft).await?;
        store::audit::record(
            conn,
            EntityKind::Protocol,
            protocol.id,
            None,
            ProtocolStatus::Signing.as_str(),
            Some(actor),
        )
        .await?;

        let mut signed = Vec::new();
        if let Some(signer) = auto_signer {
            store::signatures::insert(conn, EntityKind::Protocol, protocol.id, signer, Utc::now())
                .await?;
            signed.push(signer);
        }
        Self::open_sign_tasks(
            conn,
            self.rules.required_signers(EntityKind::Protocol),
            &signed,
            &format!("Подписать протокол «{}»", protocol.title),
            EntityKind::Protocol,
            protocol.id,
        )
        .await?;

        tracing::info!(
            protocol_id = %protocol.id,
            kind = protocol.kind.as_str(),
            amount = protocol.amount,
            "protocol created"
        );
        effects.notify(Notice::new(
            NotificationEvent::ProtocolCreated,
            EntityKind::Protocol,
            protocol.id,
            &protocol.title,
        )
        .skipping(&signed));
        effects.emit(WorkflowEvent::ProtocolCreated {
            protocol_id: protocol.id,
        });

        // A single configured signer can complete the quorum on creation
        self.complete_protocol_quorum(conn, &protocol, actor, effects)
            .await?;
        store::protocols::get(conn, protocol.id).await
    }

    /// Move a fully signed protocol to `ready_to_number`. Returns true only
    /// for the caller that performed the transition.
    async fn complete_protocol_quorum(
        &self,
        conn: &mut SqliteConnection,
        protocol: &Protocol,
        actor: Uuid,
        effects: &mut Effects,
    ) -> Result<bool> {
        let set = store::signatures::load_set(conn, EntityKind::Protocol, protocol.id).await?;
        if !quorum::is_complete(&set, self.rules.required_signers(EntityKind::Protocol)) {
            return Ok(false);
        }
        if !store::protocols::transition(
            conn,
            protocol.id,
            ProtocolStatus::Signing,
            ProtocolStatus::ReadyToNumber,
        )
        .await?
        {
            return Ok(false);
        }

        store::audit::record(
            conn,
            EntityKind::Protocol,
            protocol.id,
            Some(ProtocolStatus::Signing.as_str()),
            ProtocolStatus::ReadyToNumber.as_str(),
            Some(actor),
        )
        .await?;

        tracing::info!(protocol_id = %protocol.id, "protocol ready to number");
        effects.notify(Notice::new(
            NotificationEvent::ProtocolReady,
            EntityKind::Protocol,
            protocol.id,
            &protocol.title,
        ));
        effects.emit(WorkflowEvent::ProtocolStatusChanged {
            protocol_id: protocol.id,
            status: ProtocolStatus::ReadyToNumber,
            finance_status: protocol.finance_status,
        });
        Ok(true)
    }

    pub async fn sign_protocol(&self, actor: Uuid, id: Uuid) -> Result<ProtocolSignOutcome> {
        if !self.rules.is_protocol_signer(actor) {
            return Err(AppError::Forbidden(
                "Вы не входите в список подписантов протокола".to_string(),
            ));
        }

        let mut effects = Effects::default();
        let mut tx = self.store.begin().await?;
        let protocol = store::protocols::get(&mut tx, id).await?;

        let already_signed = protocol.signatures.iter().any(|s| s.user_id == actor);
        if !already_signed && protocol.status != ProtocolStatus::Signing {
            return Err(AppError::Conflict(format!(
                "Протокол не ожидает подписи (статус: {})",
                protocol.status.as_str()
            )));
        }

        let newly_signed =
            store::signatures::insert(&mut tx, EntityKind::Protocol, id, actor, Utc::now()).await?;
        if newly_signed {
            store::tasks::complete_for(&mut tx, actor, EntityKind::Protocol, id).await?;
            self.complete_protocol_quorum(&mut tx, &protocol, actor, &mut effects)
                .await?;
        }

        let protocol = store::protocols::get(&mut tx, id).await?;
        tx.commit().await?;

        let set = SignatureSet::from(protocol.signatures.as_slice());
        let quorum = quorum::check(&set, self.rules.required_signers(EntityKind::Protocol));
        if newly_signed {
            tracing::info!(
                protocol_id = %id,
                signer = %actor,
                collected = quorum.collected,
                required = quorum.required,
                "protocol signed"
            );
            effects.emit(WorkflowEvent::ProtocolSigned {
                protocol_id: id,
                user_id: actor,
                quorum_complete: quorum.is_complete(),
            });
        }
        self.publish(effects).await;

        Ok(ProtocolSignOutcome {
            protocol,
            newly_signed,
            quorum,
        })
    }

    /// Give a fully signed protocol the next number of the current year
    pub async fn assign_number(&self, actor: Uuid, id: Uuid) -> Result<Protocol> {
        if !self.rules.is_tender_manager(actor) {
            return Err(AppError::Forbidden(
                "Присвоить номер может только ответственный за тендеры".to_string(),
            ));
        }

        let mut effects = Effects::default();
        let mut tx = self.store.begin().await?;
        let protocol = store::protocols::get(&mut tx, id).await?;
        if protocol.status != ProtocolStatus::ReadyToNumber {
            return Err(AppError::Conflict(
                "Протокол ещё не подписан всеми участниками".to_string(),
            ));
        }
        let set = SignatureSet::from(protocol.signatures.as_slice());
        if !quorum::is_complete(&set, self.rules.required_signers(EntityKind::Protocol)) {
            return Err(AppError::Conflict(
                "Протокол ещё не подписан всеми участниками".to_string(),
            ));
        }

        let now = Utc::now();
        let number = store::protocols::next_number(&mut tx, now.year()).await?;
        if !store::protocols::assign_number(&mut tx, id, &number, now).await? {
            return Err(AppError::Conflict("Номер протоколу уже присвоен".to_string()));
        }
        store::audit::record(
            &mut tx,
            EntityKind::Protocol,
            id,
            Some(ProtocolStatus::ReadyToNumber.as_str()),
            ProtocolStatus::Numbered.as_str(),
            Some(actor),
        )
        .await?;
        store::audit::record(
            &mut tx,
            EntityKind::Protocol,
            id,
            Some(&finance_key(FinanceStatus::NotSubmitted)),
            &finance_key(FinanceStatus::Waiting),
            Some(actor),
        )
        .await?;
        let protocol = store::protocols::get(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(protocol_id = %id, %number, "protocol numbered");
        effects.emit(WorkflowEvent::ProtocolStatusChanged {
            protocol_id: id,
            status: protocol.status,
            finance_status: protocol.finance_status,
        });
        self.publish(effects).await;

        Ok(protocol)
    }

    pub async fn submit_to_finance(&self, actor: Uuid, id: Uuid) -> Result<Protocol> {
        if !self.rules.is_tender_manager(actor) {
            return Err(AppError::Forbidden(
                "Передать протокол в финансовый отдел может только ответственный за тендеры"
                    .to_string(),
            ));
        }

        let mut effects = Effects::default();
        let mut tx = self.store.begin().await?;
        let protocol = store::protocols::get(&mut tx, id).await?;
        if protocol.status != ProtocolStatus::Numbered
            || !store::protocols::set_finance_status(
                &mut tx,
                id,
                FinanceStatus::Waiting,
                FinanceStatus::Submitted,
                Utc::now(),
            )
            .await?
        {
            return Err(AppError::Conflict(
                "Протокол не ожидает передачи в финансовый отдел".to_string(),
            ));
        }
        store::audit::record(
            &mut tx,
            EntityKind::Protocol,
            id,
            Some(&finance_key(FinanceStatus::Waiting)),
            &finance_key(FinanceStatus::Submitted),
            Some(actor),
        )
        .await?;
        let protocol = store::protocols::get(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(protocol_id = %id, "protocol submitted to finance");
        effects.notify(
            Notice::new(
                NotificationEvent::FinanceSubmitted,
                EntityKind::Protocol,
                id,
                &protocol.title,
            )
            .with_detail(protocol.number.clone().unwrap_or_default()),
        );
        effects.emit(WorkflowEvent::ProtocolStatusChanged {
            protocol_id: id,
            status: protocol.status,
            finance_status: protocol.finance_status,
        });
        self.publish(effects).await;

        Ok(protocol)
    }

    /// Record payment, schedule the delivery follow-up and archive the protocol
    pub async fn mark_paid(&self, actor: Uuid, id: Uuid) -> Result<PaymentOutcome> {
        if !self.rules.is_finance_officer(actor) {
            return Err(AppError::Forbidden(
                "Отметить оплату может только финансовый отдел".to_string(),
            ));
        }

        let mut effects = Effects::default();
        let mut tx = self.store.begin().await?;
        let paid_at = Utc::now();
        if !store::protocols::set_finance_status(
            &mut tx,
            id,
            FinanceStatus::Submitted,
            FinanceStatus::Paid,
            paid_at,
        )
        .await?
        {
            // Distinguish a missing protocol from one in the wrong state
            store::protocols::get(&mut tx, id).await?;
            return Err(AppError::Conflict(
                "Протокол не передан в финансовый отдел".to_string(),
            ));
        }
        store::audit::record(
            &mut tx,
            EntityKind::Protocol,
            id,
            Some(&finance_key(FinanceStatus::Submitted)),
            &finance_key(FinanceStatus::Paid),
            Some(actor),
        )
        .await?;

        let protocol = store::protocols::get(&mut tx, id).await?;
        let number = protocol
            .number
            .clone()
            .ok_or_else(|| AppError::Internal(format!("paid protocol {} has no number", id)))?;

        let followup = Duration::try_days(self.rules.payment_followup_days)
            .and_then(|delay| paid_at.checked_add_signed(delay))
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "payment_followup_days out of range: {}",
                    self.rules.payment_followup_days
                ))
            })?
            .date_naive();
        let calendar_event = store::calendar::insert(
            &mut tx,
            &format!("Контроль поставки по протоколу № {}", number),
            followup,
            Some(id),
        )
        .await?;

        if !store::protocols::transition(&mut tx, id, ProtocolStatus::Numbered, ProtocolStatus::Archived)
            .await?
        {
            return Err(AppError::Conflict("Протокол уже в архиве".to_string()));
        }
        store::audit::record(
            &mut tx,
            EntityKind::Protocol,
            id,
            Some(ProtocolStatus::Numbered.as_str()),
            ProtocolStatus::Archived.as_str(),
            Some(actor),
        )
        .await?;

        let mut signers = Vec::with_capacity(protocol.signatures.len());
        for sig in &protocol.signatures {
            if let Some(user) = store::users::find(&mut tx, sig.user_id).await? {
                signers.push(user);
            }
        }
        let protocol = store::protocols::get(&mut tx, id).await?;
        let bundle = documents::render_bundle(&protocol, &number, &signers);
        let archive = store::archive::insert(&mut tx, &protocol, &number, bundle).await?;
        store::tasks::complete_all_for(&mut tx, EntityKind::Protocol, id).await?;
        tx.commit().await?;

        tracing::info!(
            protocol_id = %id,
            %number,
            archive_id = %archive.id,
            followup = %calendar_event.date,
            "protocol paid and archived"
        );
        effects.notify(
            Notice::new(
                NotificationEvent::ProtocolPaid,
                EntityKind::Protocol,
                id,
                &protocol.title,
            )
            .with_detail(number),
        );
        effects.emit(WorkflowEvent::ProtocolStatusChanged {
            protocol_id: id,
            status: protocol.status,
            finance_status: protocol.finance_status,
        });
        effects.emit(WorkflowEvent::ProtocolArchived {
            protocol_id: id,
            archive_id: archive.id,
        });
        self.publish(effects).await;

        Ok(PaymentOutcome {
            protocol,
            archive,
            calendar_event,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finance_key() {
        assert_eq!(finance_key(FinanceStatus::Waiting), "finance:waiting");
        assert_eq!(finance_key(FinanceStatus::Paid), "finance:paid");
    }
}
