//! Active patient context and its durable mirror.
//!
//! The store owns the single [`PatientContext`] every workflow reads. Reads
//! are synchronous; writes go to the durable adapter first so a restart
//! resumes with the same patient.

use std::path::{Path, PathBuf};

use crate::api::ClinicalApi;
use crate::error::WorkflowError;
use crate::models::{NewPatient, PatientContext};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Where the active context is mirrored between runs.
pub trait ContextStorage: Send {
    fn load(&self) -> Result<Option<PatientContext>, StorageError>;
    fn store(&mut self, context: &PatientContext) -> Result<(), StorageError>;
    fn clear(&mut self) -> Result<(), StorageError>;
}

/// JSON file mirror, by default `~/StrokeLink/active_patient.json`.
pub struct FileContextStorage {
    path: PathBuf,
}

impl FileContextStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContextStorage for FileContextStorage {
    fn load(&self) -> Result<Option<PatientContext>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn store(&mut self, context: &PatientContext) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(context)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local mirror for tests and embedders without a home directory.
#[derive(Debug, Default)]
pub struct MemoryContextStorage {
    context: Option<PatientContext>,
}

impl ContextStorage for MemoryContextStorage {
    fn load(&self) -> Result<Option<PatientContext>, StorageError> {
        Ok(self.context.clone())
    }

    fn store(&mut self, context: &PatientContext) -> Result<(), StorageError> {
        self.context = Some(context.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.context = None;
        Ok(())
    }
}

pub struct PatientIdentityStore {
    storage: Box<dyn ContextStorage>,
    current: Option<PatientContext>,
}

impl PatientIdentityStore {
    /// Open the store, resuming from the mirror when it holds a context.
    /// An unreadable mirror is logged and treated as empty.
    pub fn new(storage: Box<dyn ContextStorage>) -> Self {
        let current = match storage.load() {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable patient context mirror");
                None
            }
        };
        if let Some(ctx) = &current {
            tracing::debug!(patient_id = %ctx.patient_id, "Resumed active patient");
        }
        Self { storage, current }
    }

    pub fn get(&self) -> Option<&PatientContext> {
        self.current.as_ref()
    }

    /// The active context, or a validation error naming what is missing.
    pub fn require(&self) -> Result<&PatientContext, WorkflowError> {
        self.current
            .as_ref()
            .ok_or_else(|| WorkflowError::Validation("No active patient. Look up or register a patient first.".into()))
    }

    /// Make `context` the active patient.
    ///
    /// For the patient already active, fields present in the stored context
    /// win and `context` only fills gaps. A different patient replaces the
    /// context outright.
    pub fn set(&mut self, context: PatientContext) -> Result<&PatientContext, WorkflowError> {
        let next = match &self.current {
            Some(existing) if existing.patient_id == context.patient_id => {
                PatientContext::merged_over(existing, context)
            }
            _ => context,
        };
        self.storage.store(&next)?;
        tracing::info!(patient_id = %next.patient_id, "Active patient set");
        Ok(&*self.current.insert(next))
    }

    /// Find a patient by patient id or national id number and make it active.
    pub fn resolve(&mut self, api: &dyn ClinicalApi, query: &str) -> Result<&PatientContext, WorkflowError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(WorkflowError::Validation("Please enter a patient ID or ID number.".into()));
        }

        let record = api
            .list_patients()?
            .into_iter()
            .find(|p| p.matches(query))
            .ok_or_else(|| {
                tracing::debug!(query, "Patient lookup found no match");
                WorkflowError::NotFound(format!("No patient found for \"{query}\"."))
            })?;

        self.set(record.into_context())
    }

    /// Register a new patient and make it active.
    pub fn register(&mut self, api: &dyn ClinicalApi, patient: NewPatient) -> Result<&PatientContext, WorkflowError> {
        patient.validate().map_err(WorkflowError::Validation)?;
        let patient_id = api.register_patient(&patient)?;
        tracing::info!(patient_id = %patient_id, "Registered patient");
        self.set(patient.into_context(patient_id))
    }

    /// Attach the signed-in doctor if none is attached yet.
    ///
    /// Returns whether the context changed.
    pub fn attach_doctor(&mut self, username: &str) -> Result<bool, WorkflowError> {
        let username = username.trim();
        let Some(current) = &self.current else {
            return Err(WorkflowError::Validation("No active patient to attach a doctor to.".into()));
        };
        if username.is_empty() || current.has_doctor() {
            return Ok(false);
        }

        let mut next = current.clone();
        next.doctor_username = Some(username.to_string());
        self.storage.store(&next)?;
        tracing::debug!(patient_id = %next.patient_id, doctor = username, "Attached doctor");
        self.current = Some(next);
        Ok(true)
    }

    pub fn clear(&mut self) -> Result<(), WorkflowError> {
        self.storage.clear()?;
        self.current = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, Endpoint, MockClinicalApi};
    use crate::error::ErrorKind;
    use crate::models::PatientRecord;

    fn record(patient_id: &str, id_number: &str) -> PatientRecord {
        PatientRecord {
            patient_id: patient_id.into(),
            id_number: id_number.into(),
            name: "Thandi Nkosi".into(),
            gender: "Female".into(),
            phone: "0821234567".into(),
            age: 61,
        }
    }

    fn memory_store() -> PatientIdentityStore {
        PatientIdentityStore::new(Box::new(MemoryContextStorage::default()))
    }

    fn intake() -> NewPatient {
        NewPatient {
            id_number: "8507125800083".into(),
            name: "Sipho Dlamini".into(),
            phone: "0831112222".into(),
            age: 39,
            gender: "Male".into(),
        }
    }

    #[test]
    fn resolve_by_either_identifier() {
        let api = MockClinicalApi::new()
            .with_patient(record("41", "7001015009081"))
            .with_patient(record("42", "9001015009087"));
        let mut store = memory_store();

        assert_eq!(store.resolve(&api, "42").unwrap().id_number, "9001015009087");
        assert_eq!(store.resolve(&api, " 7001015009081 ").unwrap().patient_id, "41");
        assert_eq!(api.calls(Endpoint::ListPatients), 2);
    }

    #[test]
    fn resolve_unknown_patient_is_not_found() {
        let api = MockClinicalApi::new().with_patient(record("42", "9001015009087"));
        let mut store = memory_store();
        let err = store.resolve(&api, "99").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(store.get().is_none());
    }

    #[test]
    fn blank_lookup_issues_no_call() {
        let api = MockClinicalApi::new();
        let mut store = memory_store();
        let err = store.resolve(&api, "   ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(api.total_calls(), 0);
    }

    #[test]
    fn re_resolving_same_patient_keeps_doctor() {
        let api = MockClinicalApi::new().with_patient(record("42", "9001015009087"));
        let mut store = memory_store();
        store.resolve(&api, "42").unwrap();
        assert!(store.attach_doctor("dr.mokoena").unwrap());

        let ctx = store.resolve(&api, "9001015009087").unwrap();
        assert_eq!(ctx.doctor_username.as_deref(), Some("dr.mokoena"));
    }

    #[test]
    fn resolving_new_patient_replaces_context() {
        let api = MockClinicalApi::new()
            .with_patient(record("41", "7001015009081"))
            .with_patient(record("42", "9001015009087"));
        let mut store = memory_store();
        store.resolve(&api, "41").unwrap();
        store.attach_doctor("dr.mokoena").unwrap();

        let ctx = store.resolve(&api, "42").unwrap();
        assert_eq!(ctx.patient_id, "42");
        assert!(ctx.doctor_username.is_none());
    }

    #[test]
    fn attach_doctor_only_when_absent() {
        let api = MockClinicalApi::new().with_patient(record("42", "9001015009087"));
        let mut store = memory_store();
        store.resolve(&api, "42").unwrap();

        assert!(store.attach_doctor("dr.mokoena").unwrap());
        assert!(!store.attach_doctor("dr.other").unwrap());
        assert_eq!(store.get().unwrap().doctor_or_unknown(), "dr.mokoena");
    }

    #[test]
    fn attach_doctor_without_patient_is_validation() {
        let mut store = memory_store();
        assert_eq!(store.attach_doctor("dr.mokoena").unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn register_sets_active_patient() {
        let api = MockClinicalApi::new();
        let mut store = memory_store();
        let ctx = store.register(&api, intake()).unwrap();
        assert_eq!(ctx.name, "Sipho Dlamini");
        assert!(!ctx.patient_id.is_empty());

        let patient_id = ctx.patient_id.clone();
        assert_eq!(store.resolve(&api, "8507125800083").unwrap().patient_id, patient_id);
    }

    #[test]
    fn invalid_intake_is_blocked_locally() {
        let api = MockClinicalApi::new();
        let mut store = memory_store();
        let mut patient = intake();
        patient.phone = "12ab".into();
        let err = store.register(&api, patient).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(api.calls(Endpoint::RegisterPatient), 0);
    }

    #[test]
    fn server_intake_rejection_is_validation() {
        let api = MockClinicalApi::new();
        api.fail(
            Endpoint::RegisterPatient,
            ApiError::Rejected {
                status: 400,
                detail: Some("Name or gender does not match existing record for this ID number.".into()),
            },
        );
        let mut store = memory_store();
        let err = store.register(&api, intake()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.user_message().contains("does not match"));
    }

    #[test]
    fn file_mirror_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("active_patient.json");
        let api = MockClinicalApi::new().with_patient(record("42", "9001015009087"));

        {
            let mut store = PatientIdentityStore::new(Box::new(FileContextStorage::new(&path)));
            store.resolve(&api, "42").unwrap();
            store.attach_doctor("dr.mokoena").unwrap();
        }

        let store = PatientIdentityStore::new(Box::new(FileContextStorage::new(&path)));
        let ctx = store.get().unwrap();
        assert_eq!(ctx.patient_id, "42");
        assert_eq!(ctx.doctor_username.as_deref(), Some("dr.mokoena"));
    }

    #[test]
    fn corrupt_mirror_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("active_patient.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = PatientIdentityStore::new(Box::new(FileContextStorage::new(&path)));
        assert!(store.get().is_none());
    }

    #[test]
    fn clear_removes_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("active_patient.json");
        let api = MockClinicalApi::new().with_patient(record("42", "9001015009087"));
        let mut store = PatientIdentityStore::new(Box::new(FileContextStorage::new(&path)));
        store.resolve(&api, "42").unwrap();
        assert!(path.exists());

        store.clear().unwrap();
        assert!(store.get().is_none());
        assert!(!path.exists());
        store.clear().unwrap();
    }
}
