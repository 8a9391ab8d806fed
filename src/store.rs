//! `ClinicStore`: the data-layer surface the presentation layer talks to.
//!
//! Each operation names the tables it touches so the guard can create any
//! that an older database lacks, then runs in a single transaction. The
//! store supplies the clock; domain functions take `now` explicitly.

use std::path::Path;

use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::db::repository as repo;
use crate::db::schema::{TableSpec, CLINIC_NEEDS, LAB_ORDERS, MEDICATIONS, PATIENTS, PAYMENTS, SMART_ALERTS, TOOTH_TREATMENTS};
use crate::db::startup::StartupReport;
use crate::db::{Database, DatabaseError};
use crate::models::*;
use crate::{alerts, billing, lab_orders, treatments};

static BILLING_TABLES: &[&TableSpec] = &[&PATIENTS, &TOOTH_TREATMENTS, &LAB_ORDERS, &PAYMENTS];
static ALERT_TABLES: &[&TableSpec] = &[&PATIENTS, &SMART_ALERTS];

pub struct ClinicStore {
    db: Database,
    startup: StartupReport,
}

impl ClinicStore {
    /// Open the store at the configured path, migrating and repairing the
    /// schema. Startup problems land in [`Self::startup_report`].
    pub fn open(config: &StoreConfig) -> Result<Self, DatabaseError> {
        Self::open_path(&config.db_path)
    }

    pub fn open_path(path: &Path) -> Result<Self, DatabaseError> {
        let (db, startup) = crate::db::open_database(path)?;
        Ok(Self { db, startup })
    }

    /// Private in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let (db, startup) = crate::db::open_memory_database()?;
        Ok(Self { db, startup })
    }

    pub fn startup_report(&self) -> &StartupReport {
        &self.startup
    }

    pub fn is_healthy(&self) -> bool {
        self.db.is_healthy()
    }

    pub fn reinitialize(&mut self) -> Result<(), DatabaseError> {
        self.db.reinitialize()
    }

    pub fn close(&mut self) -> Result<(), DatabaseError> {
        self.db.close()
    }

    fn now() -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }

    // ═══════════════════════════════════════════
    // Patients
    // ═══════════════════════════════════════════

    pub fn create_patient(&mut self, new: &NewPatient) -> Result<Patient, DatabaseError> {
        let full_name = new.full_name.trim();
        if full_name.is_empty() {
            return Err(DatabaseError::ConstraintViolation("patient name is required".into()));
        }
        let now = Self::now();
        let patient = Patient {
            id: Uuid::new_v4(),
            full_name: full_name.to_string(),
            phone: new.phone.clone(),
            date_of_birth: new.date_of_birth,
            notes: new.notes.clone(),
            created_at: now,
            updated_at: now,
        };
        self.db.write(&[&PATIENTS], |tx| repo::insert_patient(tx, &patient))?;
        Ok(patient)
    }

    pub fn get_patient(&mut self, id: &Uuid) -> Result<Patient, DatabaseError> {
        self.db
            .read(&[&PATIENTS], |conn| repo::get_patient(conn, id))?
            .ok_or_else(|| DatabaseError::not_found("patient", id))
    }

    pub fn list_patients(&mut self) -> Result<Vec<Patient>, DatabaseError> {
        self.db.read(&[&PATIENTS], repo::list_patients)
    }

    /// Removes the patient with every treatment, lab order, payment and alert
    /// that belongs to them.
    pub fn delete_patient(&mut self, id: &Uuid) -> Result<(), DatabaseError> {
        let tables = [&PATIENTS, &TOOTH_TREATMENTS, &LAB_ORDERS, &PAYMENTS, &SMART_ALERTS];
        self.db.write(&tables, |tx| {
            if !repo::delete_patient(tx, id)? {
                return Err(DatabaseError::not_found("patient", id));
            }
            Ok(())
        })
    }

    // ═══════════════════════════════════════════
    // Treatments
    // ═══════════════════════════════════════════

    pub fn create_treatment(&mut self, new: &NewTreatment) -> Result<Treatment, DatabaseError> {
        let now = Self::now();
        self.db.write(BILLING_TABLES, |tx| treatments::create_treatment(tx, new, now))
    }

    pub fn get_treatment(&mut self, id: &Uuid) -> Result<Treatment, DatabaseError> {
        self.db
            .read(&[&TOOTH_TREATMENTS], |conn| repo::get_treatment(conn, id))?
            .ok_or_else(|| DatabaseError::not_found("treatment", id))
    }

    pub fn list_treatments_for_tooth(&mut self, group: &TreatmentGroup) -> Result<Vec<Treatment>, DatabaseError> {
        self.db
            .read(&[&TOOTH_TREATMENTS], |conn| repo::list_treatments_for_tooth(conn, group))
    }

    pub fn list_treatments_for_patient(&mut self, patient_id: &Uuid) -> Result<Vec<Treatment>, DatabaseError> {
        self.db
            .read(&[&TOOTH_TREATMENTS], |conn| repo::list_treatments_for_patient(conn, patient_id))
    }

    pub fn update_treatment(&mut self, id: &Uuid, update: &TreatmentUpdate) -> Result<Treatment, DatabaseError> {
        let now = Self::now();
        self.db
            .write(BILLING_TABLES, |tx| treatments::update_treatment(tx, id, update, now))
    }

    pub fn delete_treatment(&mut self, id: &Uuid) -> Result<TreatmentDeletion, DatabaseError> {
        let now = Self::now();
        self.db.write(BILLING_TABLES, |tx| treatments::delete_treatment(tx, id, now))
    }

    pub fn reorder_treatments(
        &mut self,
        group: &TreatmentGroup,
        ordered_ids: &[Uuid],
    ) -> Result<Vec<Treatment>, DatabaseError> {
        let now = Self::now();
        self.db.write(&[&TOOTH_TREATMENTS], |tx| {
            treatments::reorder_treatments(tx, group, ordered_ids, now)
        })
    }

    // ═══════════════════════════════════════════
    // Payments
    // ═══════════════════════════════════════════

    pub fn record_payment(&mut self, new: &NewPayment) -> Result<Payment, DatabaseError> {
        let now = Self::now();
        self.db.write(BILLING_TABLES, |tx| billing::record_payment(tx, new, now))
    }

    pub fn get_payment(&mut self, id: &Uuid) -> Result<Payment, DatabaseError> {
        self.db
            .read(BILLING_TABLES, |conn| repo::get_payment(conn, id))?
            .ok_or_else(|| DatabaseError::not_found("payment", id))
    }

    pub fn list_payments_for_patient(&mut self, patient_id: &Uuid) -> Result<Vec<Payment>, DatabaseError> {
        self.db
            .read(BILLING_TABLES, |conn| repo::list_payments_for_patient(conn, patient_id))
    }

    pub fn update_payment(&mut self, id: &Uuid, update: &PaymentUpdate) -> Result<Payment, DatabaseError> {
        let now = Self::now();
        self.db.write(BILLING_TABLES, |tx| billing::update_payment(tx, id, update, now))
    }

    pub fn delete_payment(&mut self, id: &Uuid) -> Result<(), DatabaseError> {
        self.db.write(BILLING_TABLES, |tx| billing::delete_payment(tx, id))
    }

    pub fn patient_balance(&mut self, patient_id: &Uuid) -> Result<PatientBalance, DatabaseError> {
        self.db
            .read(BILLING_TABLES, |conn| billing::patient_balance(conn, patient_id))
    }

    // ═══════════════════════════════════════════
    // Lab orders
    // ═══════════════════════════════════════════

    pub fn create_lab_order(&mut self, new: &NewLabOrder) -> Result<LabOrder, DatabaseError> {
        let now = Self::now();
        self.db.write(BILLING_TABLES, |tx| lab_orders::create_lab_order(tx, new, now))
    }

    pub fn get_lab_order(&mut self, id: &Uuid) -> Result<LabOrder, DatabaseError> {
        self.db
            .read(&[&LAB_ORDERS], |conn| repo::get_lab_order(conn, id))?
            .ok_or_else(|| DatabaseError::not_found("lab_order", id))
    }

    /// All lab orders, or only one patient's.
    pub fn list_lab_orders(&mut self, patient_id: Option<&Uuid>) -> Result<Vec<LabOrder>, DatabaseError> {
        self.db.read(&[&LAB_ORDERS], |conn| match patient_id {
            Some(patient_id) => repo::list_lab_orders_for_patient(conn, patient_id),
            None => repo::list_lab_orders(conn),
        })
    }

    pub fn update_lab_order(&mut self, id: &Uuid, update: &LabOrderUpdate) -> Result<LabOrder, DatabaseError> {
        let now = Self::now();
        self.db
            .write(BILLING_TABLES, |tx| lab_orders::update_lab_order(tx, id, update, now))
    }

    pub fn delete_lab_order(&mut self, id: &Uuid) -> Result<usize, DatabaseError> {
        self.db.write(BILLING_TABLES, |tx| lab_orders::delete_lab_order(tx, id))
    }

    // ═══════════════════════════════════════════
    // Alerts
    // ═══════════════════════════════════════════

    pub fn create_alert(&mut self, new: &NewAlert) -> Result<Alert, DatabaseError> {
        let now = Self::now();
        self.db.write(ALERT_TABLES, |tx| alerts::create_alert(tx, new, now))
    }

    pub fn list_active_alerts(&mut self) -> Result<Vec<Alert>, DatabaseError> {
        let now = Self::now();
        self.db.write(ALERT_TABLES, |tx| alerts::list_active(tx, now))
    }

    pub fn get_alert(&mut self, id: &Uuid) -> Result<Alert, DatabaseError> {
        self.db
            .read(ALERT_TABLES, |conn| repo::get_alert(conn, id))?
            .ok_or_else(|| DatabaseError::not_found("alert", id))
    }

    pub fn mark_alert_read(&mut self, id: &Uuid) -> Result<(), DatabaseError> {
        let now = Self::now();
        self.db.write(ALERT_TABLES, |tx| alerts::mark_read(tx, id, now))
    }

    pub fn dismiss_alert(&mut self, id: &Uuid) -> Result<(), DatabaseError> {
        let now = Self::now();
        self.db.write(ALERT_TABLES, |tx| alerts::dismiss(tx, id, now))
    }

    pub fn snooze_alert(&mut self, id: &Uuid, until: NaiveDateTime) -> Result<(), DatabaseError> {
        let now = Self::now();
        self.db.write(ALERT_TABLES, |tx| alerts::snooze(tx, id, until, now))
    }

    pub fn delete_alert(&mut self, id: &Uuid) -> Result<(), DatabaseError> {
        self.db.write(ALERT_TABLES, |tx| alerts::delete_alert(tx, id))
    }

    // ═══════════════════════════════════════════
    // Medications and clinic needs
    // ═══════════════════════════════════════════

    pub fn add_medication(&mut self, new: &NewMedication) -> Result<Medication, DatabaseError> {
        if new.name.trim().is_empty() {
            return Err(DatabaseError::ConstraintViolation("medication name is required".into()));
        }
        let now = Self::now();
        let med = Medication {
            id: Uuid::new_v4(),
            name: new.name.trim().to_string(),
            dosage_form: new.dosage_form.clone(),
            strength: new.strength.clone(),
            instructions: new.instructions.clone(),
            created_at: now,
            updated_at: now,
        };
        self.db.write(&[&MEDICATIONS], |tx| repo::insert_medication(tx, &med))?;
        Ok(med)
    }

    pub fn list_medications(&mut self) -> Result<Vec<Medication>, DatabaseError> {
        self.db.read(&[&MEDICATIONS], repo::list_medications)
    }

    pub fn delete_medication(&mut self, id: &Uuid) -> Result<(), DatabaseError> {
        self.db.write(&[&MEDICATIONS], |tx| {
            if !repo::delete_medication(tx, id)? {
                return Err(DatabaseError::not_found("medication", id));
            }
            Ok(())
        })
    }

    pub fn add_clinic_need(&mut self, new: &NewClinicNeed) -> Result<ClinicNeed, DatabaseError> {
        if new.need_name.trim().is_empty() {
            return Err(DatabaseError::ConstraintViolation("need name is required".into()));
        }
        if new.quantity < 0 || new.price.is_negative() {
            return Err(DatabaseError::ConstraintViolation("quantity and price cannot be negative".into()));
        }
        let now = Self::now();
        let need = ClinicNeed {
            id: Uuid::new_v4(),
            need_name: new.need_name.trim().to_string(),
            quantity: new.quantity,
            price: new.price,
            supplier: new.supplier.clone(),
            category: new.category.clone(),
            priority: new.priority,
            status: NeedStatus::Pending,
            notes: new.notes.clone(),
            created_at: now,
            updated_at: now,
        };
        self.db.write(&[&CLINIC_NEEDS], |tx| repo::insert_clinic_need(tx, &need))?;
        Ok(need)
    }

    pub fn list_clinic_needs(&mut self) -> Result<Vec<ClinicNeed>, DatabaseError> {
        self.db.read(&[&CLINIC_NEEDS], repo::list_clinic_needs)
    }

    pub fn update_clinic_need_status(&mut self, id: &Uuid, status: NeedStatus) -> Result<ClinicNeed, DatabaseError> {
        let now = Self::now();
        self.db.write(&[&CLINIC_NEEDS], |tx| {
            repo::set_clinic_need_status(tx, id, status, now)?;
            repo::get_clinic_need(tx, id)?.ok_or_else(|| DatabaseError::not_found("clinic_need", id))
        })
    }

    pub fn delete_clinic_need(&mut self, id: &Uuid) -> Result<(), DatabaseError> {
        self.db.write(&[&CLINIC_NEEDS], |tx| {
            if !repo::delete_clinic_need(tx, id)? {
                return Err(DatabaseError::not_found("clinic_need", id));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::db::ErrorKind;

    fn patient(store: &mut ClinicStore, name: &str) -> Patient {
        store
            .create_patient(&NewPatient { full_name: name.into(), ..Default::default() })
            .unwrap()
    }

    fn treatment(store: &mut ClinicStore, patient_id: Uuid, kind: &str, cost: i64) -> Treatment {
        store
            .create_treatment(&NewTreatment {
                patient_id,
                tooth_number: ToothNumber::new(26).unwrap(),
                treatment_type: kind.into(),
                treatment_category: Some("restorative".into()),
                status: TreatmentStatus::Planned,
                cost: Money::from_cents(cost),
                start_date: None,
                notes: None,
            })
            .unwrap()
    }

    fn payment(patient_id: Uuid, link: PaymentLink, amount: i64) -> NewPayment {
        NewPayment {
            patient_id,
            link,
            amount: Money::from_cents(amount),
            payment_method: PaymentMethod::Cash,
            payment_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            description: None,
            receipt_number: None,
            notes: None,
            total_amount_due: None,
            amount_paid: None,
        }
    }

    #[test]
    fn billing_scenario_end_to_end() {
        let mut store = ClinicStore::open_in_memory().unwrap();
        assert!(store.startup_report().is_clean());
        let ada = patient(&mut store, "Ada");
        let crown = treatment(&mut store, ada.id, "crown", 100_000);
        let link = PaymentLink::Treatment { treatment_id: crown.id };

        store.record_payment(&payment(ada.id, link, 40_000)).unwrap();
        store.record_payment(&payment(ada.id, link, 40_000)).unwrap();
        let crown = store.get_treatment(&crown.id).unwrap();
        assert_eq!(crown.total_paid, Money::from_cents(80_000));
        assert_eq!(crown.remaining_balance, Money::from_cents(20_000));

        let balance = store.patient_balance(&ada.id).unwrap();
        assert_eq!(balance.remaining, Money::from_cents(20_000));

        let removed = store.delete_treatment(&crown.id).unwrap();
        assert_eq!(removed.payments_removed, 2);
        assert!(store.list_payments_for_patient(&ada.id).unwrap().is_empty());
        assert_eq!(store.get_treatment(&crown.id).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn reorder_through_store() {
        let mut store = ClinicStore::open_in_memory().unwrap();
        let ada = patient(&mut store, "Ada");
        let a = treatment(&mut store, ada.id, "a", 0);
        let b = treatment(&mut store, ada.id, "b", 0);
        let c = treatment(&mut store, ada.id, "c", 0);

        let order = store.reorder_treatments(&a.group(), &[c.id, a.id, b.id]).unwrap();
        let ids: Vec<Uuid> = order.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![c.id, a.id, b.id]);

        let err = store.reorder_treatments(&a.group(), &[c.id, a.id, Uuid::new_v4()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedReorder);
        let unchanged: Vec<Uuid> = store
            .list_treatments_for_tooth(&a.group())
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(unchanged, vec![c.id, a.id, b.id]);
    }

    #[test]
    fn deleting_patient_removes_dependents() {
        let mut store = ClinicStore::open_in_memory().unwrap();
        let ada = patient(&mut store, "Ada");
        let t = treatment(&mut store, ada.id, "crown", 500);
        store
            .record_payment(&payment(ada.id, PaymentLink::Treatment { treatment_id: t.id }, 100))
            .unwrap();
        store
            .create_alert(&NewAlert {
                id: None,
                kind: AlertKind::TreatmentFollowUp { patient_id: ada.id, treatment_id: t.id },
                priority: AlertPriority::Medium,
                title: "Check crown fit".into(),
                description: None,
                action_required: false,
                due_date: None,
            })
            .unwrap();

        store.delete_patient(&ada.id).unwrap();
        assert!(store.list_treatments_for_patient(&ada.id).unwrap().is_empty());
        assert!(store.list_payments_for_patient(&ada.id).unwrap().is_empty());
        assert!(store.list_active_alerts().unwrap().is_empty());
        assert_eq!(store.delete_patient(&ada.id).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn missing_lazy_table_is_recreated_on_use() {
        let mut store = ClinicStore::open_in_memory().unwrap();
        // nothing has required these tables yet, so the guard has no memo of them
        store
            .db
            .write(&[], |tx| {
                tx.execute_batch("DROP TABLE smart_alerts; DROP TABLE clinic_needs;")?;
                Ok(())
            })
            .unwrap();

        assert!(store.list_active_alerts().unwrap().is_empty());
        let need = store
            .add_clinic_need(&NewClinicNeed {
                need_name: "Composite resin".into(),
                quantity: 4,
                price: "18.90".parse().unwrap(),
                supplier: Some("DentSupply".into()),
                category: None,
                priority: NeedPriority::High,
                notes: None,
            })
            .unwrap();
        let updated = store.update_clinic_need_status(&need.id, NeedStatus::Ordered).unwrap();
        assert_eq!(updated.status, NeedStatus::Ordered);
        assert_eq!(store.list_clinic_needs().unwrap().len(), 1);
    }

    #[test]
    fn medications_catalogue() {
        let mut store = ClinicStore::open_in_memory().unwrap();
        let med = store
            .add_medication(&NewMedication { name: "Amoxicillin".into(), ..Default::default() })
            .unwrap();
        assert_eq!(store.list_medications().unwrap().len(), 1);
        store.delete_medication(&med.id).unwrap();
        assert_eq!(store.delete_medication(&med.id).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            store.add_medication(&NewMedication::default()).unwrap_err().kind(),
            ErrorKind::ConstraintViolation
        );
    }

    #[test]
    fn file_store_survives_close_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            db_path: dir.path().join("clinic.db"),
            log_filter: "warn".into(),
        };
        let ada_id = {
            let mut store = ClinicStore::open(&config).unwrap();
            let ada = patient(&mut store, "Ada");
            store.close().unwrap();
            // closed handles reopen on demand
            assert_eq!(store.list_patients().unwrap().len(), 1);
            assert!(store.is_healthy());
            ada.id
        };

        let mut store = ClinicStore::open(&config).unwrap();
        assert!(store.startup_report().applied_migrations.is_empty());
        assert_eq!(store.get_patient(&ada_id).unwrap().full_name, "Ada");
        store.reinitialize().unwrap();
        assert_eq!(store.list_patients().unwrap().len(), 1);
    }

    #[test]
    fn alert_dedup_through_store() {
        let mut store = ClinicStore::open_in_memory().unwrap();
        let need_id = Uuid::new_v4();
        let new = NewAlert {
            id: None,
            kind: AlertKind::LowStock { need_id },
            priority: AlertPriority::High,
            title: "Gloves running low".into(),
            description: None,
            action_required: true,
            due_date: None,
        };
        let first = store.create_alert(&new).unwrap();
        let second = store.create_alert(&new).unwrap();
        assert_eq!(first.id, second.id);

        store.mark_alert_read(&first.id).unwrap();
        assert!(store.get_alert(&first.id).unwrap().is_read);
        store.dismiss_alert(&first.id).unwrap();
        assert!(store.list_active_alerts().unwrap().is_empty());
        store.delete_alert(&first.id).unwrap();
        assert_eq!(store.get_alert(&first.id).unwrap_err().kind(), ErrorKind::NotFound);
    }
}
