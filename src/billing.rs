//! Balance reconciliation.
//!
//! Every payment write recomputes the balance of whatever the payment pays
//! for, from scratch, in the caller's transaction. Treatments and lab orders
//! hold `{cost, paid, remaining}`; every payment linked to one of them carries
//! a copy of that triple. A general payment carries its own.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::repository::*;
use crate::db::DatabaseError;
use crate::models::*;

// ═══════════════════════════════════════════
// Balance arithmetic
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceTriple {
    pub total_due: Money,
    pub total_paid: Money,
    pub remaining: Money,
}

impl BalanceTriple {
    /// `remaining = max(0, due - paid)`. Nothing is owed on a zero cost.
    pub fn compute(total_due: Money, total_paid: Money) -> Self {
        let remaining = if total_due.is_zero() {
            Money::ZERO
        } else {
            total_due.saturating_remaining(total_paid)
        };
        Self {
            total_due,
            total_paid,
            remaining,
        }
    }

    pub fn status(&self) -> PaymentStatus {
        if self.total_due.is_zero() || self.remaining.is_zero() {
            PaymentStatus::Completed
        } else if self.total_paid > Money::ZERO {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Pending
        }
    }
}

// ═══════════════════════════════════════════
// Recompute
// ═══════════════════════════════════════════

/// Recompute a treatment from its linked payments and refresh those payments.
pub fn recompute_treatment(conn: &Connection, treatment_id: &Uuid) -> Result<BalanceTriple, DatabaseError> {
    let treatment = get_treatment(conn, treatment_id)?
        .ok_or_else(|| DatabaseError::not_found("treatment", treatment_id))?;
    let paid = sum_payments_for_treatment(conn, treatment_id)?;
    let triple = BalanceTriple::compute(treatment.cost, paid);
    let status = triple.status();

    set_treatment_balance(conn, treatment_id, triple.total_paid, triple.remaining, status)?;
    set_linked_payment_balances(
        conn,
        &PaymentLink::Treatment { treatment_id: *treatment_id },
        triple.total_due,
        triple.total_paid,
        triple.remaining,
        status,
    )?;
    tracing::debug!(%treatment_id, paid = %triple.total_paid, remaining = %triple.remaining, "Treatment balance recomputed");
    Ok(triple)
}

/// Recompute a lab order from its linked payments and refresh those payments.
pub fn recompute_lab_order(conn: &Connection, lab_order_id: &Uuid) -> Result<BalanceTriple, DatabaseError> {
    let order = get_lab_order(conn, lab_order_id)?
        .ok_or_else(|| DatabaseError::not_found("lab_order", lab_order_id))?;
    let paid = sum_payments_for_lab_order(conn, lab_order_id)?;
    let triple = BalanceTriple::compute(order.cost, paid);
    let status = triple.status();

    set_lab_order_balance(conn, lab_order_id, triple.total_paid, triple.remaining, status)?;
    set_linked_payment_balances(
        conn,
        &PaymentLink::LabOrder { lab_order_id: *lab_order_id },
        triple.total_due,
        triple.total_paid,
        triple.remaining,
        status,
    )?;
    tracing::debug!(%lab_order_id, paid = %triple.total_paid, remaining = %triple.remaining, "Lab order balance recomputed");
    Ok(triple)
}

/// Recompute whatever `link` points at. General payments have nothing to do.
pub fn recompute(conn: &Connection, link: &PaymentLink) -> Result<Option<BalanceTriple>, DatabaseError> {
    match link {
        PaymentLink::General => Ok(None),
        PaymentLink::Treatment { treatment_id } => recompute_treatment(conn, treatment_id).map(Some),
        PaymentLink::LabOrder { lab_order_id } => recompute_lab_order(conn, lab_order_id).map(Some),
    }
}

// ═══════════════════════════════════════════
// Payment writes
// ═══════════════════════════════════════════

pub fn record_payment(conn: &Connection, new: &NewPayment, now: NaiveDateTime) -> Result<Payment, DatabaseError> {
    check_amounts(new.amount, new.total_amount_due, new.amount_paid)?;
    if !patient_exists(conn, &new.patient_id)? {
        return Err(DatabaseError::not_found("patient", new.patient_id));
    }
    check_link(conn, &new.link, &new.patient_id)?;

    let own = general_triple(new.amount, new.total_amount_due, new.amount_paid);
    let payment = Payment {
        id: Uuid::new_v4(),
        patient_id: new.patient_id,
        link: new.link,
        amount: new.amount,
        payment_method: new.payment_method,
        payment_date: new.payment_date,
        description: new.description.clone(),
        status: own.status(),
        total_amount_due: own.total_due,
        amount_paid: own.total_paid,
        remaining_balance: own.remaining,
        receipt_number: new.receipt_number.clone(),
        notes: new.notes.clone(),
        created_at: now,
        updated_at: now,
    };
    insert_payment(conn, &payment)?;
    recompute(conn, &payment.link)?;

    tracing::info!(payment_id = %payment.id, amount = %payment.amount, link = ?payment.link, "Payment recorded");
    reload(conn, &payment.id)
}

pub fn update_payment(
    conn: &Connection,
    id: &Uuid,
    update: &PaymentUpdate,
    now: NaiveDateTime,
) -> Result<Payment, DatabaseError> {
    let existing = get_payment(conn, id)?.ok_or_else(|| DatabaseError::not_found("payment", id))?;
    let old_link = existing.link;

    let mut payment = existing.clone();
    if let Some(link) = update.link {
        payment.link = link;
    }
    if let Some(amount) = update.amount {
        payment.amount = amount;
    }
    if let Some(method) = update.payment_method {
        payment.payment_method = method;
    }
    if let Some(date) = update.payment_date {
        payment.payment_date = date;
    }
    if let Some(description) = &update.description {
        payment.description = Some(description.clone());
    }
    if let Some(receipt) = &update.receipt_number {
        payment.receipt_number = Some(receipt.clone());
    }
    if let Some(notes) = &update.notes {
        payment.notes = Some(notes.clone());
    }
    check_amounts(payment.amount, update.total_amount_due, update.amount_paid)?;
    check_link(conn, &payment.link, &payment.patient_id)?;

    // A general payment keeps its own totals unless the caller changes them.
    // A settled figure that tracked the amount keeps tracking it.
    let was_general = matches!(existing.link, PaymentLink::General);
    let prior_due = was_general.then_some(existing.total_amount_due);
    let prior_paid = (was_general && existing.amount_paid != existing.amount).then_some(existing.amount_paid);
    let own = general_triple(
        payment.amount,
        update.total_amount_due.or(prior_due),
        update.amount_paid.or(prior_paid),
    );
    payment.total_amount_due = own.total_due;
    payment.amount_paid = own.total_paid;
    payment.remaining_balance = own.remaining;
    payment.status = own.status();
    payment.updated_at = now;

    update_payment_row(conn, &payment)?;
    if old_link != payment.link {
        recompute(conn, &old_link)?;
    }
    recompute(conn, &payment.link)?;

    tracing::info!(payment_id = %id, amount = %payment.amount, link = ?payment.link, "Payment updated");
    reload(conn, id)
}

pub fn delete_payment(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let existing = get_payment(conn, id)?.ok_or_else(|| DatabaseError::not_found("payment", id))?;
    delete_payment_row(conn, id)?;
    recompute(conn, &existing.link)?;
    tracing::info!(payment_id = %id, "Payment deleted");
    Ok(())
}

/// Totals across a patient's treatments, lab orders and general payments.
pub fn patient_balance(conn: &Connection, patient_id: &Uuid) -> Result<PatientBalance, DatabaseError> {
    if !patient_exists(conn, patient_id)? {
        return Err(DatabaseError::not_found("patient", patient_id));
    }
    let (cost, paid, remaining): (i64, i64, i64) = conn.query_row(
        "SELECT
            COALESCE((SELECT SUM(cost) FROM tooth_treatments WHERE patient_id = ?1), 0)
          + COALESCE((SELECT SUM(cost) FROM lab_orders WHERE patient_id = ?1), 0)
          + COALESCE((SELECT SUM(total_amount_due) FROM payments
                      WHERE patient_id = ?1 AND tooth_treatment_id IS NULL AND lab_order_id IS NULL), 0),
            COALESCE((SELECT SUM(total_paid) FROM tooth_treatments WHERE patient_id = ?1), 0)
          + COALESCE((SELECT SUM(paid_amount) FROM lab_orders WHERE patient_id = ?1), 0)
          + COALESCE((SELECT SUM(amount_paid) FROM payments
                      WHERE patient_id = ?1 AND tooth_treatment_id IS NULL AND lab_order_id IS NULL), 0),
            COALESCE((SELECT SUM(remaining_balance) FROM tooth_treatments WHERE patient_id = ?1), 0)
          + COALESCE((SELECT SUM(remaining_balance) FROM lab_orders WHERE patient_id = ?1), 0)
          + COALESCE((SELECT SUM(remaining_balance) FROM payments
                      WHERE patient_id = ?1 AND tooth_treatment_id IS NULL AND lab_order_id IS NULL), 0)",
        params![patient_id.to_string()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    Ok(PatientBalance {
        total_cost: Money::from_cents(cost),
        total_paid: Money::from_cents(paid),
        remaining: Money::from_cents(remaining),
    })
}

fn general_triple(amount: Money, due: Option<Money>, paid: Option<Money>) -> BalanceTriple {
    BalanceTriple::compute(due.unwrap_or(amount), paid.unwrap_or(amount))
}

fn check_amounts(amount: Money, due: Option<Money>, paid: Option<Money>) -> Result<(), DatabaseError> {
    if amount.is_negative() {
        return Err(DatabaseError::ConstraintViolation(format!("payment amount {amount} is negative")));
    }
    if due.is_some_and(Money::is_negative) || paid.is_some_and(Money::is_negative) {
        return Err(DatabaseError::ConstraintViolation("payment totals cannot be negative".into()));
    }
    Ok(())
}

/// The linked entity must exist and belong to the paying patient.
fn check_link(conn: &Connection, link: &PaymentLink, patient_id: &Uuid) -> Result<(), DatabaseError> {
    let owner = match link {
        PaymentLink::General => return Ok(()),
        PaymentLink::Treatment { treatment_id } => {
            let t = get_treatment(conn, treatment_id)?
                .ok_or_else(|| DatabaseError::not_found("treatment", treatment_id))?;
            Some(t.patient_id)
        }
        PaymentLink::LabOrder { lab_order_id } => {
            let o = get_lab_order(conn, lab_order_id)?
                .ok_or_else(|| DatabaseError::not_found("lab_order", lab_order_id))?;
            o.patient_id
        }
    };
    match owner {
        Some(owner) if owner != *patient_id => Err(DatabaseError::ConstraintViolation(
            "payment patient does not match the billed patient".into(),
        )),
        _ => Ok(()),
    }
}

fn reload(conn: &Connection, id: &Uuid) -> Result<Payment, DatabaseError> {
    get_payment(conn, id)?.ok_or_else(|| DatabaseError::not_found("payment", id))
}
