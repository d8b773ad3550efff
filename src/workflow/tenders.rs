//! Supplier offers, winner selection and tender cancellation

use serde::Serialize;
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::{Effects, WorkflowEngine, WorkflowEvent};
use crate::error::{AppError, Result};
use crate::models::{
    EntityKind, NewSupplier, Protocol, ProtocolKind, SelectWinner, Supplier, SupplierPatch,
    Tender, TenderStatus,
};
use crate::notify::{Notice, NotificationEvent};
use crate::store::{self, protocols::ProtocolDraft};

#[derive(Debug, Clone, Serialize)]
pub struct WinnerOutcome {
    pub tender: Tender,
    pub protocol: Protocol,
}

fn validate_offer(company_name: Option<&str>, price: Option<f64>) -> Result<()> {
    if company_name.is_some_and(|name| name.trim().is_empty()) {
        return Err(AppError::BadRequest("Укажите название компании".to_string()));
    }
    if price.is_some_and(|p| !p.is_finite() || p < 0.0) {
        return Err(AppError::BadRequest(
            "Цена предложения не может быть отрицательной".to_string(),
        ));
    }
    Ok(())
}

async fn active_tender(conn: &mut SqliteConnection, id: Uuid) -> Result<Tender> {
    let tender = store::tenders::get(conn, id).await?;
    if tender.status != TenderStatus::Active {
        return Err(AppError::Conflict(format!(
            "Тендер «{}» уже закрыт",
            tender.title
        )));
    }
    Ok(tender)
}

impl WorkflowEngine {
    pub async fn add_supplier(
        &self,
        actor: Uuid,
        tender_id: Uuid,
        input: NewSupplier,
    ) -> Result<Supplier> {
        validate_offer(Some(&input.company_name), Some(input.price))?;

        let mut effects = Effects::default();
        let mut tx = self.store.begin().await?;
        let tender = active_tender(&mut tx, tender_id).await?;
        let supplier = store::tenders::insert_supplier(&mut tx, tender_id, &input, actor).await?;
        tx.commit().await?;

        tracing::info!(%tender_id, supplier_id = %supplier.id, "offer submitted");
        effects.notify(
            Notice::new(
                NotificationEvent::OfferSubmitted,
                EntityKind::Tender,
                tender_id,
                &tender.title,
            )
            .with_detail(format!("{}, {:.2} руб.", supplier.company_name, supplier.price)),
        );
        effects.emit(WorkflowEvent::SupplierChanged {
            tender_id,
            supplier_id: supplier.id,
        });
        self.publish(effects).await;

        Ok(supplier)
    }

    /// Edit an offer. Allowed for the offer's author and supplier admins.
    pub async fn update_supplier(
        &self,
        actor: Uuid,
        supplier_id: Uuid,
        patch: SupplierPatch,
    ) -> Result<Supplier> {
        validate_offer(patch.company_name.as_deref(), patch.price)?;

        let mut effects = Effects::default();
        let mut tx = self.store.begin().await?;
        let existing = store::tenders::get_supplier(&mut tx, supplier_id).await?;
        if !self.rules.can_edit_supplier(actor, existing.created_by) {
            return Err(AppError::Forbidden(
                "Недостаточно прав для изменения предложения".to_string(),
            ));
        }
        active_tender(&mut tx, existing.tender_id).await?;

        let supplier = store::tenders::update_supplier(&mut tx, supplier_id, &patch).await?;
        tx.commit().await?;

        tracing::debug!(%supplier_id, "offer updated");
        effects.emit(WorkflowEvent::SupplierChanged {
            tender_id: supplier.tender_id,
            supplier_id,
        });
        self.publish(effects).await;

        Ok(supplier)
    }

    pub async fn delete_supplier(&self, actor: Uuid, supplier_id: Uuid) -> Result<()> {
        let mut effects = Effects::default();
        let mut tx = self.store.begin().await?;
        let existing = store::tenders::get_supplier(&mut tx, supplier_id).await?;
        if !self.rules.can_edit_supplier(actor, existing.created_by) {
            return Err(AppError::Forbidden(
                "Недостаточно прав для удаления предложения".to_string(),
            ));
        }
        active_tender(&mut tx, existing.tender_id).await?;

        store::tenders::delete_supplier(&mut tx, supplier_id).await?;
        tx.commit().await?;

        tracing::info!(%supplier_id, tender_id = %existing.tender_id, "offer deleted");
        effects.emit(WorkflowEvent::SupplierChanged {
            tender_id: existing.tender_id,
            supplier_id,
        });
        self.publish(effects).await;

        Ok(())
    }

    /// Close the tender with a winner and open its protocol.
    ///
    /// The protocol is pre-signed by the configured auto-signer; everyone
    /// else on the protocol signer list gets a task.
    pub async fn select_winner(
        &self,
        actor: Uuid,
        tender_id: Uuid,
        choice: SelectWinner,
    ) -> Result<WinnerOutcome> {
        if !self.rules.is_tender_manager(actor) {
            return Err(AppError::Forbidden(
                "Выбрать победителя может только ответственный за тендеры".to_string(),
            ));
        }

        let mut effects = Effects::default();
        let mut tx = self.store.begin().await?;
        let tender = active_tender(&mut tx, tender_id).await?;

        let winner = tender
            .supplier(choice.winner_id)
            .cloned()
            .ok_or_else(|| {
                AppError::BadRequest("Победитель должен быть участником тендера".to_string())
            })?;
        if let Some(reserve) = choice.reserve_winner_id {
            if reserve == winner.id {
                return Err(AppError::BadRequest(
                    "Резервный победитель должен отличаться от основного".to_string(),
                ));
            }
            if tender.supplier(reserve).is_none() {
                return Err(AppError::BadRequest(
                    "Резервный победитель должен быть участником тендера".to_string(),
                ));
            }
        }

        if !store::tenders::complete(&mut tx, tender_id, winner.id, choice.reserve_winner_id).await? {
            return Err(AppError::Conflict("Тендер уже закрыт".to_string()));
        }
        store::audit::record(
            &mut tx,
            EntityKind::Tender,
            tender_id,
            Some(TenderStatus::Active.as_str()),
            TenderStatus::Completed.as_str(),
            Some(actor),
        )
        .await?;
        effects.notify(
            Notice::new(
                NotificationEvent::TenderCompleted,
                EntityKind::Tender,
                tender_id,
                &tender.title,
            )
            .with_detail(winner.company_name.clone()),
        );

        let draft = ProtocolDraft {
            kind: ProtocolKind::Tender,
            tender_id: Some(tender_id),
            request_id: tender.request_id,
            title: tender.title.clone(),
            supplier_name: Some(winner.company_name.clone()),
            amount: winner.price,
        };
        let protocol = self
            .open_protocol(
                &mut tx,
                draft,
                Some(self.rules.protocol_auto_signer),
                actor,
                &mut effects,
            )
            .await?;

        let tender = store::tenders::get(&mut tx, tender_id).await?;
        tx.commit().await?;

        tracing::info!(
            %tender_id,
            winner = %winner.company_name,
            protocol_id = %protocol.id,
            "tender completed"
        );
        effects.emit(WorkflowEvent::TenderStatusChanged {
            tender_id,
            status: tender.status,
        });
        self.publish(effects).await;

        Ok(WinnerOutcome { tender, protocol })
    }

    pub async fn cancel_tender(&self, actor: Uuid, tender_id: Uuid) -> Result<Tender> {
        if !self.rules.is_tender_manager(actor) {
            return Err(AppError::Forbidden(
                "Отменить тендер может только ответственный за тендеры".to_string(),
            ));
        }

        let mut effects = Effects::default();
        let mut tx = self.store.begin().await?;
        let tender = store::tenders::get(&mut tx, tender_id).await?;
        if !store::tenders::cancel(&mut tx, tender_id).await? {
            return Err(AppError::Conflict(format!(
                "Тендер «{}» уже закрыт",
                tender.title
            )));
        }
        store::audit::record(
            &mut tx,
            EntityKind::Tender,
            tender_id,
            Some(TenderStatus::Active.as_str()),
            TenderStatus::Cancelled.as_str(),
            Some(actor),
        )
        .await?;
        let tender = store::tenders::get(&mut tx, tender_id).await?;
        tx.commit().await?;

        tracing::info!(%tender_id, "tender cancelled");
        effects.notify(Notice::new(
            NotificationEvent::TenderCancelled,
            EntityKind::Tender,
            tender_id,
            &tender.title,
        ));
        effects.emit(WorkflowEvent::TenderStatusChanged {
            tender_id,
            status: tender.status,
        });
        self.publish(effects).await;

        Ok(tender)
    }
}
