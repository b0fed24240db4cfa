use crate::ports::{PatientDirectory, PatientRecord, ProviderFuture};

/// Directory used until a real patient index is wired in: nobody is on file, so every caller
/// is treated as a new patient.
#[derive(Clone, Debug, Default)]
pub struct UnlistedPatients;

impl PatientDirectory for UnlistedPatients {
    fn find_by_phone<'a>(&'a self, _phone: &'a str) -> ProviderFuture<'a, Option<PatientRecord>> {
        Box::pin(async move { Ok(None) })
    }
}
