use super::{
    errors::{JobError, PoolError},
    model::Job,
};
use serde_json::Value;
use std::fmt;


pub type PoolResult<T> = Result<T, PoolError>;


/// Recorded result of executing one job
#[derive(Clone)]
pub struct Outcome {
    job: Job,
    result: Result<Value, JobError>,
}

impl Outcome {
    pub fn new(job: Job, result: Result<Value, JobError>) -> Self {
        Self { job, result }
    }

    pub fn success(job: Job, value: Value) -> Self {
        Self::new(job, Ok(value))
    }

    pub fn failure(job: Job, error: JobError) -> Self {
        Self::new(job, Err(error))
    }

    #[inline]
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// `true` iff the callable completed without failing
    #[inline]
    pub fn status(&self) -> bool {
        self.result.is_ok()
    }

    #[inline]
    pub fn return_value(&self) -> Option<&Value> {
        self.result.as_ref().ok()
    }

    #[inline]
    pub fn error(&self) -> Option<&JobError> {
        self.result.as_ref().err()
    }

    pub fn into_result(self) -> Result<Value, JobError> {
        self.result
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outcome")
            .field("job", &self.job.id())
            .field("status", &self.status())
            .field("return_value", &self.return_value())
            .field("error", &self.error())
            .finish()
    }
}
