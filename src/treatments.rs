//! Tooth treatments and their per-tooth ordering.
//!
//! Treatments of one patient on one tooth form a group whose priorities are
//! always exactly `1..N`. Creation appends, deletion compacts, and `reorder`
//! rewrites the whole group from a caller-supplied permutation.

use std::collections::HashSet;

use chrono::NaiveDateTime;
use rusqlite::Connection;
use uuid::Uuid;

use crate::billing::{self, BalanceTriple};
use crate::db::repository::*;
use crate::db::DatabaseError;
use crate::models::*;

pub fn create_treatment(conn: &Connection, new: &NewTreatment, now: NaiveDateTime) -> Result<Treatment, DatabaseError> {
    if new.cost.is_negative() {
        return Err(DatabaseError::ConstraintViolation(format!("treatment cost {} is negative", new.cost)));
    }
    if new.treatment_type.trim().is_empty() {
        return Err(DatabaseError::ConstraintViolation("treatment type is required".into()));
    }
    if !patient_exists(conn, &new.patient_id)? {
        return Err(DatabaseError::not_found("patient", new.patient_id));
    }

    let group = TreatmentGroup {
        patient_id: new.patient_id,
        tooth_number: new.tooth_number,
    };
    let balance = BalanceTriple::compute(new.cost, Money::ZERO);
    let treatment = Treatment {
        id: Uuid::new_v4(),
        patient_id: new.patient_id,
        tooth_number: new.tooth_number,
        treatment_type: new.treatment_type.trim().to_string(),
        treatment_category: new.treatment_category.clone(),
        status: new.status,
        priority: max_treatment_priority(conn, &group)? + 1,
        cost: new.cost,
        total_paid: balance.total_paid,
        remaining_balance: balance.remaining,
        payment_status: balance.status(),
        start_date: new.start_date,
        completion_date: None,
        notes: new.notes.clone(),
        created_at: now,
        updated_at: now,
    };
    insert_treatment(conn, &treatment)?;
    tracing::info!(
        treatment_id = %treatment.id,
        tooth = %treatment.tooth_number,
        priority = treatment.priority,
        "Treatment created"
    );
    Ok(treatment)
}

pub fn update_treatment(
    conn: &Connection,
    id: &Uuid,
    update: &TreatmentUpdate,
    now: NaiveDateTime,
) -> Result<Treatment, DatabaseError> {
    let mut treatment = get_treatment(conn, id)?.ok_or_else(|| DatabaseError::not_found("treatment", id))?;
    let old_cost = treatment.cost;

    if let Some(kind) = &update.treatment_type {
        if kind.trim().is_empty() {
            return Err(DatabaseError::ConstraintViolation("treatment type is required".into()));
        }
        treatment.treatment_type = kind.trim().to_string();
    }
    if let Some(category) = &update.treatment_category {
        treatment.treatment_category = Some(category.clone());
    }
    if let Some(status) = update.status {
        treatment.status = status;
    }
    if let Some(cost) = update.cost {
        if cost.is_negative() {
            return Err(DatabaseError::ConstraintViolation(format!("treatment cost {cost} is negative")));
        }
        treatment.cost = cost;
    }
    if let Some(date) = update.start_date {
        treatment.start_date = Some(date);
    }
    if let Some(date) = update.completion_date {
        treatment.completion_date = Some(date);
    }
    if let Some(notes) = &update.notes {
        treatment.notes = Some(notes.clone());
    }
    treatment.updated_at = now;

    update_treatment_fields(conn, &treatment)?;
    if treatment.cost != old_cost {
        billing::recompute_treatment(conn, id)?;
    }
    get_treatment(conn, id)?.ok_or_else(|| DatabaseError::not_found("treatment", id))
}

/// Delete a treatment with its payments, its lab orders and their payments,
/// then close the gap in its group's priorities.
pub fn delete_treatment(conn: &Connection, id: &Uuid, now: NaiveDateTime) -> Result<TreatmentDeletion, DatabaseError> {
    let treatment = get_treatment(conn, id)?.ok_or_else(|| DatabaseError::not_found("treatment", id))?;

    let payments_removed = delete_payments_for_treatment_tree(conn, id)?;
    let lab_orders_removed = delete_lab_orders_for_treatment(conn, id)?;
    delete_treatment_row(conn, id)?;
    compact_group(conn, &treatment.group(), now)?;

    tracing::info!(treatment_id = %id, payments_removed, lab_orders_removed, "Treatment deleted");
    Ok(TreatmentDeletion {
        payments_removed,
        lab_orders_removed,
    })
}

/// Rewrite a group's priorities to `1..N` in the order of `ordered_ids`.
///
/// `ordered_ids` must be exactly the group's current ids, each once.
/// Anything else is rejected before any row is touched.
pub fn reorder_treatments(
    conn: &Connection,
    group: &TreatmentGroup,
    ordered_ids: &[Uuid],
    now: NaiveDateTime,
) -> Result<Vec<Treatment>, DatabaseError> {
    let current = treatment_group_ids(conn, group)?;
    validate_permutation(group, &current, ordered_ids)?;

    for (index, id) in ordered_ids.iter().enumerate() {
        set_treatment_priority(conn, id, index as i64 + 1, now)?;
    }
    tracing::info!(
        patient_id = %group.patient_id,
        tooth = %group.tooth_number,
        count = ordered_ids.len(),
        "Treatments reordered"
    );
    list_treatments_for_tooth(conn, group)
}

fn validate_permutation(group: &TreatmentGroup, current: &[Uuid], proposed: &[Uuid]) -> Result<(), DatabaseError> {
    let malformed = |reason: String| DatabaseError::MalformedReorder {
        patient_id: group.patient_id.to_string(),
        tooth_number: group.tooth_number.get(),
        reason,
    };

    let mut seen = HashSet::with_capacity(proposed.len());
    for id in proposed {
        if !seen.insert(id) {
            return Err(malformed(format!("{id} appears more than once")));
        }
    }
    let existing: HashSet<&Uuid> = current.iter().collect();
    if let Some(foreign) = proposed.iter().find(|id| !existing.contains(id)) {
        return Err(malformed(format!("{foreign} is not in this group")));
    }
    if proposed.len() != current.len() {
        return Err(malformed(format!(
            "expected {} treatments, got {}",
            current.len(),
            proposed.len()
        )));
    }
    Ok(())
}

/// Renumber a group to `1..N`, keeping its current order.
fn compact_group(conn: &Connection, group: &TreatmentGroup, now: NaiveDateTime) -> Result<(), DatabaseError> {
    for (index, treatment) in list_treatments_for_tooth(conn, group)?.iter().enumerate() {
        let priority = index as i64 + 1;
        if treatment.priority != priority {
            set_treatment_priority(conn, &treatment.id, priority, now)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::record_payment;
    use crate::db::repository::fixtures::*;
    use crate::db::sqlite::open_memory_connection;
    use crate::db::ErrorKind;
    use crate::lab_orders::create_lab_order;

    fn now() -> NaiveDateTime {
        at("2025-03-01 10:00:00")
    }

    fn tooth(code: u8) -> ToothNumber {
        ToothNumber::new(code).unwrap()
    }

    fn new_treatment(patient_id: Uuid, code: u8, kind: &str, cost: i64) -> NewTreatment {
        NewTreatment {
            patient_id,
            tooth_number: tooth(code),
            treatment_type: kind.into(),
            treatment_category: None,
            status: TreatmentStatus::Planned,
            cost: Money::from_cents(cost),
            start_date: None,
            notes: None,
        }
    }

    fn priorities(conn: &Connection, group: &TreatmentGroup) -> Vec<(Uuid, i64)> {
        list_treatments_for_tooth(conn, group)
            .unwrap()
            .into_iter()
            .map(|t| (t.id, t.priority))
            .collect()
    }

    #[test]
    fn creation_appends_per_group() {
        let conn = open_memory_connection().unwrap();
        let patient = make_patient(&conn, "Ada");
        let a = create_treatment(&conn, &new_treatment(patient, 36, "filling", 0), now()).unwrap();
        let b = create_treatment(&conn, &new_treatment(patient, 36, "root canal", 0), now()).unwrap();
        let other = create_treatment(&conn, &new_treatment(patient, 11, "veneer", 0), now()).unwrap();
        assert_eq!((a.priority, b.priority, other.priority), (1, 2, 1));
        assert_eq!(a.payment_status, PaymentStatus::Completed);
    }

    #[test]
    fn creation_validates_input() {
        let conn = open_memory_connection().unwrap();
        let patient = make_patient(&conn, "Ada");
        let err = create_treatment(&conn, &new_treatment(patient, 36, "filling", -5), now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        let err = create_treatment(&conn, &new_treatment(patient, 36, "  ", 0), now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        let err = create_treatment(&conn, &new_treatment(Uuid::new_v4(), 36, "filling", 0), now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn reorder_applies_permutation() {
        let conn = open_memory_connection().unwrap();
        let patient = make_patient(&conn, "Ada");
        let a = create_treatment(&conn, &new_treatment(patient, 36, "a", 0), now()).unwrap();
        let b = create_treatment(&conn, &new_treatment(patient, 36, "b", 0), now()).unwrap();
        let c = create_treatment(&conn, &new_treatment(patient, 36, "c", 0), now()).unwrap();
        let group = a.group();

        let later = at("2025-03-02 08:00:00");
        let reordered = reorder_treatments(&conn, &group, &[c.id, a.id, b.id], later).unwrap();
        let order: Vec<(Uuid, i64)> = reordered.iter().map(|t| (t.id, t.priority)).collect();
        assert_eq!(order, vec![(c.id, 1), (a.id, 2), (b.id, 3)]);
        assert!(reordered.iter().all(|t| t.updated_at == later));
        assert_eq!(reordered[1].treatment_type, "a");
    }

    #[test]
    fn reorder_rejects_malformed_input_without_mutation() {
        let conn = open_memory_connection().unwrap();
        let patient = make_patient(&conn, "Ada");
        let a = create_treatment(&conn, &new_treatment(patient, 36, "a", 0), now()).unwrap();
        let b = create_treatment(&conn, &new_treatment(patient, 36, "b", 0), now()).unwrap();
        let elsewhere = create_treatment(&conn, &new_treatment(patient, 37, "x", 0), now()).unwrap();
        let group = a.group();
        let before = priorities(&conn, &group);

        for bad in [
            vec![b.id, elsewhere.id],
            vec![b.id, Uuid::new_v4()],
            vec![b.id],
            vec![b.id, a.id, a.id],
            vec![b.id, b.id],
        ] {
            let err = reorder_treatments(&conn, &group, &bad, now()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedReorder, "{bad:?}");
            assert_eq!(priorities(&conn, &group), before);
        }
    }

    #[test]
    fn reorder_keeps_payments_attached() {
        let conn = open_memory_connection().unwrap();
        let patient = make_patient(&conn, "Ada");
        let a = create_treatment(&conn, &new_treatment(patient, 36, "a", 1000), now()).unwrap();
        let b = create_treatment(&conn, &new_treatment(patient, 36, "b", 0), now()).unwrap();
        record_payment(
            &conn,
            &NewPayment {
                patient_id: patient,
                link: PaymentLink::Treatment { treatment_id: a.id },
                amount: Money::from_cents(300),
                payment_method: PaymentMethod::Card,
                payment_date: day(2025, 3, 1),
                description: None,
                receipt_number: None,
                notes: None,
                total_amount_due: None,
                amount_paid: None,
            },
            now(),
        )
        .unwrap();

        reorder_treatments(&conn, &a.group(), &[b.id, a.id], now()).unwrap();
        assert_eq!(list_payments_for_treatment(&conn, &a.id).unwrap().len(), 1);
        assert_eq!(get_treatment(&conn, &a.id).unwrap().unwrap().remaining_balance, Money::from_cents(700));
    }

    #[test]
    fn delete_cascades_and_compacts() {
        let conn = open_memory_connection().unwrap();
        let patient = make_patient(&conn, "Ada");
        let a = create_treatment(&conn, &new_treatment(patient, 36, "a", 1000), now()).unwrap();
        let b = create_treatment(&conn, &new_treatment(patient, 36, "b", 0), now()).unwrap();
        let c = create_treatment(&conn, &new_treatment(patient, 36, "c", 0), now()).unwrap();

        let payment = |link, amount| NewPayment {
            patient_id: patient,
            link,
            amount: Money::from_cents(amount),
            payment_method: PaymentMethod::Cash,
            payment_date: day(2025, 3, 1),
            description: None,
            receipt_number: None,
            notes: None,
            total_amount_due: None,
            amount_paid: None,
        };
        record_payment(&conn, &payment(PaymentLink::Treatment { treatment_id: a.id }, 400), now()).unwrap();
        record_payment(&conn, &payment(PaymentLink::Treatment { treatment_id: a.id }, 400), now()).unwrap();
        let a_now = get_treatment(&conn, &a.id).unwrap().unwrap();
        assert_eq!(a_now.total_paid, Money::from_cents(800));
        assert_eq!(a_now.remaining_balance, Money::from_cents(200));

        let order = create_lab_order(
            &conn,
            &NewLabOrder {
                patient_id: None,
                treatment_id: Some(a.id),
                lab_name: "Smile Lab".into(),
                service_name: "zirconia crown".into(),
                cost: Money::from_cents(500),
                order_date: day(2025, 3, 1),
                expected_date: None,
                notes: None,
            },
            now(),
        )
        .unwrap();
        record_payment(&conn, &payment(PaymentLink::LabOrder { lab_order_id: order.id }, 500), now()).unwrap();

        let summary = delete_treatment(&conn, &a.id, now()).unwrap();
        assert_eq!(summary, TreatmentDeletion { payments_removed: 3, lab_orders_removed: 1 });

        let orphans: i64 = conn
            .query_row(
                "SELECT
                    (SELECT COUNT(*) FROM payments WHERE tooth_treatment_id IS NOT NULL
                        AND tooth_treatment_id NOT IN (SELECT id FROM tooth_treatments))
                  + (SELECT COUNT(*) FROM payments WHERE lab_order_id IS NOT NULL
                        AND lab_order_id NOT IN (SELECT id FROM lab_orders))
                  + (SELECT COUNT(*) FROM lab_orders WHERE tooth_treatment_id IS NOT NULL
                        AND tooth_treatment_id NOT IN (SELECT id FROM tooth_treatments))",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(orphans, 0);
        assert!(list_payments_for_patient(&conn, &patient).unwrap().is_empty());
        assert!(get_lab_order(&conn, &order.id).unwrap().is_none());

        assert_eq!(priorities(&conn, &b.group()), vec![(b.id, 1), (c.id, 2)]);
    }

    #[test]
    fn cost_change_recomputes_balance() {
        let conn = open_memory_connection().unwrap();
        let patient = make_patient(&conn, "Ada");
        let t = create_treatment(&conn, &new_treatment(patient, 21, "crown", 1000), now()).unwrap();
        assert_eq!(t.remaining_balance, Money::from_cents(1000));
        assert_eq!(t.payment_status, PaymentStatus::Pending);

        let updated = update_treatment(
            &conn,
            &t.id,
            &TreatmentUpdate {
                cost: Some(Money::ZERO),
                status: Some(TreatmentStatus::Cancelled),
                ..Default::default()
            },
            now(),
        )
        .unwrap();
        assert_eq!(updated.remaining_balance, Money::ZERO);
        assert_eq!(updated.payment_status, PaymentStatus::Completed);
        assert_eq!(updated.status, TreatmentStatus::Cancelled);
    }

    #[test]
    fn missing_treatment_is_not_found() {
        let conn = open_memory_connection().unwrap();
        let id = Uuid::new_v4();
        assert_eq!(delete_treatment(&conn, &id, now()).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            update_treatment(&conn, &id, &TreatmentUpdate::default(), now()).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
}
