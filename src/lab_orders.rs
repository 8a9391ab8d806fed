//! Lab orders: external lab work, billed like treatments.

use chrono::NaiveDateTime;
use rusqlite::Connection;
use uuid::Uuid;

use crate::billing::{self, BalanceTriple};
use crate::db::repository::*;
use crate::db::DatabaseError;
use crate::models::*;

pub fn create_lab_order(conn: &Connection, new: &NewLabOrder, now: NaiveDateTime) -> Result<LabOrder, DatabaseError> {
    if new.cost.is_negative() {
        return Err(DatabaseError::ConstraintViolation(format!("lab order cost {} is negative", new.cost)));
    }
    if new.lab_name.trim().is_empty() || new.service_name.trim().is_empty() {
        return Err(DatabaseError::ConstraintViolation("lab and service names are required".into()));
    }

    let treatment_patient = match &new.treatment_id {
        Some(treatment_id) => {
            let t = get_treatment(conn, treatment_id)?
                .ok_or_else(|| DatabaseError::not_found("treatment", treatment_id))?;
            Some(t.patient_id)
        }
        None => None,
    };
    let patient_id = match (new.patient_id, treatment_patient) {
        (Some(given), Some(owner)) if given != owner => {
            return Err(DatabaseError::ConstraintViolation(
                "lab order patient does not match the treatment's patient".into(),
            ));
        }
        (given, owner) => given.or(owner),
    };
    if let Some(patient_id) = &patient_id {
        if !patient_exists(conn, patient_id)? {
            return Err(DatabaseError::not_found("patient", patient_id));
        }
    }

    let balance = BalanceTriple::compute(new.cost, Money::ZERO);
    let order = LabOrder {
        id: Uuid::new_v4(),
        patient_id,
        treatment_id: new.treatment_id,
        lab_name: new.lab_name.trim().to_string(),
        service_name: new.service_name.trim().to_string(),
        cost: new.cost,
        paid_amount: balance.total_paid,
        remaining_balance: balance.remaining,
        payment_status: balance.status(),
        status: LabOrderStatus::Ordered,
        order_date: new.order_date,
        expected_date: new.expected_date,
        delivered_date: None,
        notes: new.notes.clone(),
        created_at: now,
        updated_at: now,
    };
    insert_lab_order(conn, &order)?;
    tracing::info!(lab_order_id = %order.id, lab = %order.lab_name, "Lab order created");
    Ok(order)
}

pub fn update_lab_order(
    conn: &Connection,
    id: &Uuid,
    update: &LabOrderUpdate,
    now: NaiveDateTime,
) -> Result<LabOrder, DatabaseError> {
    let mut order = get_lab_order(conn, id)?.ok_or_else(|| DatabaseError::not_found("lab_order", id))?;
    let old_cost = order.cost;

    if let Some(name) = &update.lab_name {
        order.lab_name = name.trim().to_string();
    }
    if let Some(service) = &update.service_name {
        order.service_name = service.trim().to_string();
    }
    if order.lab_name.is_empty() || order.service_name.is_empty() {
        return Err(DatabaseError::ConstraintViolation("lab and service names are required".into()));
    }
    if let Some(cost) = update.cost {
        if cost.is_negative() {
            return Err(DatabaseError::ConstraintViolation(format!("lab order cost {cost} is negative")));
        }
        order.cost = cost;
    }
    if let Some(status) = update.status {
        order.status = status;
    }
    if let Some(date) = update.expected_date {
        order.expected_date = Some(date);
    }
    if let Some(date) = update.delivered_date {
        order.delivered_date = Some(date);
    }
    if let Some(notes) = &update.notes {
        order.notes = Some(notes.clone());
    }
    order.updated_at = now;

    update_lab_order_fields(conn, &order)?;
    if order.cost != old_cost {
        billing::recompute_lab_order(conn, id)?;
    }
    get_lab_order(conn, id)?.ok_or_else(|| DatabaseError::not_found("lab_order", id))
}

/// Delete a lab order and its payments. Returns how many payments went with it.
pub fn delete_lab_order(conn: &Connection, id: &Uuid) -> Result<usize, DatabaseError> {
    if get_lab_order(conn, id)?.is_none() {
        return Err(DatabaseError::not_found("lab_order", id));
    }
    let payments_removed = delete_payments_for_lab_order(conn, id)?;
    delete_lab_order_row(conn, id)?;
    tracing::info!(lab_order_id = %id, payments_removed, "Lab order deleted");
    Ok(payments_removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::record_payment;
    use crate::db::repository::fixtures::*;
    use crate::db::sqlite::open_memory_connection;
    use crate::db::ErrorKind;
    use crate::treatments::create_treatment;

    fn now() -> NaiveDateTime {
        at("2025-03-01 10:00:00")
    }

    fn order(patient_id: Option<Uuid>, treatment_id: Option<Uuid>, cost: i64) -> NewLabOrder {
        NewLabOrder {
            patient_id,
            treatment_id,
            lab_name: "Smile Lab".into(),
            service_name: "night guard".into(),
            cost: Money::from_cents(cost),
            order_date: day(2025, 3, 1),
            expected_date: Some(day(2025, 3, 8)),
            notes: None,
        }
    }

    fn pay(patient_id: Uuid, lab_order_id: Uuid, amount: i64) -> NewPayment {
        NewPayment {
            patient_id,
            link: PaymentLink::LabOrder { lab_order_id },
            amount: Money::from_cents(amount),
            payment_method: PaymentMethod::Card,
            payment_date: day(2025, 3, 2),
            description: None,
            receipt_number: Some("R-1".into()),
            notes: None,
            total_amount_due: None,
            amount_paid: None,
        }
    }

    #[test]
    fn patient_is_taken_from_treatment() {
        let conn = open_memory_connection().unwrap();
        let patient = make_patient(&conn, "Ada");
        let t = create_treatment(
            &conn,
            &NewTreatment {
                patient_id: patient,
                tooth_number: ToothNumber::new(46).unwrap(),
                treatment_type: "crown".into(),
                treatment_category: None,
                status: TreatmentStatus::InProgress,
                cost: Money::ZERO,
                start_date: None,
                notes: None,
            },
            now(),
        )
        .unwrap();
        let created = create_lab_order(&conn, &order(None, Some(t.id), 800), now()).unwrap();
        assert_eq!(created.patient_id, Some(patient));
        assert_eq!(created.remaining_balance, Money::from_cents(800));
        assert_eq!(created.payment_status, PaymentStatus::Pending);

        let other = make_patient(&conn, "Bob");
        let err = create_lab_order(&conn, &order(Some(other), Some(t.id), 800), now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    }

    #[test]
    fn payments_and_cost_changes_reconcile() {
        let conn = open_memory_connection().unwrap();
        let patient = make_patient(&conn, "Ada");
        let o = create_lab_order(&conn, &order(Some(patient), None, 800), now()).unwrap();
        record_payment(&conn, &pay(patient, o.id, 300), now()).unwrap();

        let o = get_lab_order(&conn, &o.id).unwrap().unwrap();
        assert_eq!(o.paid_amount, Money::from_cents(300));
        assert_eq!(o.remaining_balance, Money::from_cents(500));
        assert_eq!(o.payment_status, PaymentStatus::Partial);

        let o = update_lab_order(
            &conn,
            &o.id,
            &LabOrderUpdate { cost: Some(Money::from_cents(300)), status: Some(LabOrderStatus::Ready), ..Default::default() },
            now(),
        )
        .unwrap();
        assert_eq!(o.remaining_balance, Money::ZERO);
        assert_eq!(o.payment_status, PaymentStatus::Completed);
        let p = &list_payments_for_lab_order(&conn, &o.id).unwrap()[0];
        assert_eq!(p.total_amount_due, Money::from_cents(300));
        assert_eq!(p.status, PaymentStatus::Completed);
    }

    #[test]
    fn delete_takes_payments_along() {
        let conn = open_memory_connection().unwrap();
        let patient = make_patient(&conn, "Ada");
        let o = create_lab_order(&conn, &order(Some(patient), None, 800), now()).unwrap();
        record_payment(&conn, &pay(patient, o.id, 100), now()).unwrap();
        record_payment(&conn, &pay(patient, o.id, 100), now()).unwrap();

        assert_eq!(delete_lab_order(&conn, &o.id).unwrap(), 2);
        assert!(list_payments_for_patient(&conn, &patient).unwrap().is_empty());
        assert_eq!(delete_lab_order(&conn, &o.id).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn invalid_orders_are_rejected() {
        let conn = open_memory_connection().unwrap();
        let patient = make_patient(&conn, "Ada");
        assert_eq!(
            create_lab_order(&conn, &order(Some(patient), None, -1), now()).unwrap_err().kind(),
            ErrorKind::ConstraintViolation
        );
        assert_eq!(
            create_lab_order(&conn, &order(Some(Uuid::new_v4()), None, 10), now()).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            create_lab_order(&conn, &order(None, Some(Uuid::new_v4()), 10), now()).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert!(list_lab_orders(&conn).unwrap().is_empty());
    }
}
