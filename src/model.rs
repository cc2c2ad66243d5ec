use super::{
    errors::{JobError, PoolError},
    result::{Outcome, PoolResult},
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};


pub type Callable = Arc<dyn Fn(&[Value], &Map<String, Value>) -> Result<Value, JobError> + Send + Sync>;
pub type Hook = Arc<dyn Fn(&Outcome) + Send + Sync>;

static NEXT_AUTO_ID: AtomicU64 = AtomicU64::new(1);


/// Job identifier. Every variant is hashable and totally ordered.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum JobId {
    /// Assigned by the crate, unique within the process
    Auto(u64),
    Int(i64),
    UInt(u64),
    Str(String),
    Bool(bool),
}

impl JobId {
    pub fn auto() -> Self {
        JobId::Auto(NEXT_AUTO_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Builds an id from a dynamic value. `null` means "assign one";
    /// floats, arrays and objects have no usable equality/hash and are rejected.
    pub fn from_value(value: Value) -> PoolResult<Self> {
        match value {
            Value::Null => Ok(Self::auto()),
            Value::Bool(b) => Ok(JobId::Bool(b)),
            Value::String(s) => Ok(JobId::Str(s)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(JobId::Int(i))
                } else if let Some(u) = n.as_u64() {
                    Ok(JobId::UInt(u))
                } else {
                    Err(PoolError::UnhashableId("float"))
                }
            }
            Value::Array(_) => Err(PoolError::UnhashableId("array")),
            Value::Object(_) => Err(PoolError::UnhashableId("object")),
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobId::Auto(n) => write!(f, "auto-{}", n),
            JobId::Int(n) => write!(f, "{}", n),
            JobId::UInt(n) => write!(f, "{}", n),
            JobId::Str(s) => f.write_str(s),
            JobId::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl TryFrom<Value> for JobId {
    type Error = PoolError;

    fn try_from(value: Value) -> PoolResult<Self> {
        Self::from_value(value)
    }
}

impl From<i64> for JobId {
    fn from(v: i64) -> Self {
        JobId::Int(v)
    }
}

impl From<i32> for JobId {
    fn from(v: i32) -> Self {
        JobId::Int(v as i64)
    }
}

// same integer, same id: `UInt` only above `i64::MAX`, as in `from_value`
impl From<u64> for JobId {
    fn from(v: u64) -> Self {
        i64::try_from(v).map(JobId::Int).unwrap_or(JobId::UInt(v))
    }
}

impl From<usize> for JobId {
    fn from(v: usize) -> Self {
        JobId::from(v as u64)
    }
}

impl From<bool> for JobId {
    fn from(v: bool) -> Self {
        JobId::Bool(v)
    }
}

impl From<&str> for JobId {
    fn from(v: &str) -> Self {
        JobId::Str(v.to_string())
    }
}

impl From<String> for JobId {
    fn from(v: String) -> Self {
        JobId::Str(v)
    }
}


/// One unit of work. Immutable once built; cloning shares the callable.
#[derive(Clone)]
pub struct Job {
    id: JobId,
    callable: Callable,
    args: Arc<[Value]>,
    kwargs: Arc<Map<String, Value>>,
    on_success: Option<Hook>,
    on_error: Option<Hook>,
}

impl Job {
    pub fn builder<F>(callable: F) -> JobBuilder
    where
        F: Fn(&[Value], &Map<String, Value>) -> Result<Value, JobError> + Send + Sync + 'static,
    {
        JobBuilder::new(callable)
    }

    /// Job with an auto-assigned id and no arguments
    pub fn from_fn<F>(callable: F) -> Job
    where
        F: Fn(&[Value], &Map<String, Value>) -> Result<Value, JobError> + Send + Sync + 'static,
    {
        Job {
            id: JobId::auto(),
            callable: Arc::new(callable),
            args: Arc::from(Vec::new()),
            kwargs: Arc::new(Map::new()),
            on_success: None,
            on_error: None,
        }
    }

    #[inline]
    pub fn id(&self) -> &JobId {
        &self.id
    }

    #[inline]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    #[inline]
    pub fn kwargs(&self) -> &Map<String, Value> {
        &self.kwargs
    }

    pub fn has_hooks(&self) -> bool {
        self.on_success.is_some() || self.on_error.is_some()
    }

    /// Runs the callable on the current thread
    pub(crate) fn call(&self) -> Result<Value, JobError> {
        (self.callable)(&*self.args, &*self.kwargs)
    }

    /// Hook matching the outcome status, if any
    pub(crate) fn hook_for(&self, status: bool) -> Option<&Hook> {
        if status {
            self.on_success.as_ref()
        } else {
            self.on_error.as_ref()
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("args", &self.args)
            .field("kwargs", &self.kwargs)
            .field("has_hooks", &self.has_hooks())
            .finish()
    }
}


pub struct JobBuilder {
    id: Option<PoolResult<JobId>>,
    callable: Callable,
    args: Vec<Value>,
    kwargs: Map<String, Value>,
    on_success: Option<Hook>,
    on_error: Option<Hook>,
}

impl JobBuilder {
    fn new<F>(callable: F) -> Self
    where
        F: Fn(&[Value], &Map<String, Value>) -> Result<Value, JobError> + Send + Sync + 'static,
    {
        Self {
            id: None,
            callable: Arc::new(callable),
            args: Vec::new(),
            kwargs: Map::new(),
            on_success: None,
            on_error: None,
        }
    }

    pub fn id(mut self, id: impl Into<JobId>) -> Self {
        self.id = Some(Ok(id.into()));
        self
    }

    /// Dynamic id, validated in [`JobBuilder::build`]
    pub fn id_value(mut self, id: Value) -> Self {
        self.id = Some(JobId::from_value(id));
        self
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn args<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.args.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    pub fn on_success<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Outcome) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(hook));
        self
    }

    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Outcome) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> PoolResult<Job> {
        let id = match self.id {
            Some(id) => id?,
            None => JobId::auto(),
        };
        Ok(Job {
            id,
            callable: self.callable,
            args: Arc::from(self.args),
            kwargs: Arc::new(self.kwargs),
            on_success: self.on_success,
            on_error: self.on_error,
        })
    }
}


#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    pub active_workers: usize,
    pub retiring_workers: usize,
    pub queued_requests: usize,
    pub queued_results: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
}

impl PoolMetrics {
    pub fn finished_jobs(&self) -> usize {
        self.completed_jobs + self.failed_jobs
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.finished_jobs();
        if total == 0 {
            return 1.0;
        }
        self.completed_jobs as f64 / total as f64
    }

    pub fn queue_pressure(&self) -> f64 {
        if self.active_workers == 0 {
            return self.queued_requests as f64;
        }
        self.queued_requests as f64 / self.active_workers as f64
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn noop(_: &[Value], _: &Map<String, Value>) -> Result<Value, JobError> {
        Ok(Value::Null)
    }

    #[test]
    fn auto_ids_are_unique() {
        let ids: HashSet<JobId> = (0..100).map(|_| Job::from_fn(noop).id().clone()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn null_id_is_auto_assigned() {
        let job = Job::builder(noop).id_value(Value::Null).build().unwrap();
        assert!(matches!(job.id(), JobId::Auto(_)));
    }

    #[test]
    fn unhashable_ids_are_rejected() {
        let err = Job::builder(noop).id_value(json!([1, 2])).build().unwrap_err();
        assert_eq!(err, PoolError::UnhashableId("array"));

        assert_eq!(
            JobId::from_value(json!({"a": 1})).unwrap_err(),
            PoolError::UnhashableId("object")
        );
        assert_eq!(
            JobId::from_value(json!(1.5)).unwrap_err(),
            PoolError::UnhashableId("float")
        );
    }

    #[test]
    fn builder_collects_arguments() {
        let job = Job::builder(|args, kwargs| {
            let a = args[0].as_i64().unwrap_or(0);
            let b = kwargs.get("b").and_then(Value::as_i64).unwrap_or(0);
            Ok(json!(a + b))
        })
        .id("sum")
        .arg(2)
        .kwarg("b", 3)
        .build()
        .unwrap();

        assert_eq!(job.id(), &JobId::Str("sum".into()));
        assert_eq!(job.args(), &[json!(2)]);
        assert_eq!(job.call().unwrap(), json!(5));
        assert!(!job.has_hooks());
    }

    #[test]
    fn integer_ids_are_equal_whatever_their_source() {
        let dynamic = JobId::from_value(json!(5)).unwrap();
        assert_eq!(JobId::from(5_u64), dynamic);
        assert_eq!(JobId::from(5_usize), dynamic);
        assert_eq!(JobId::from(5_i64), dynamic);

        let ids: HashSet<JobId> = [JobId::from(5_u64), JobId::from(5_i32), dynamic].into_iter().collect();
        assert_eq!(ids.len(), 1);

        let big = u64::MAX;
        assert_eq!(JobId::from(big), JobId::UInt(big));
        assert_eq!(JobId::from(big), JobId::from_value(json!(big)).unwrap());

        let job = Job::builder(noop).id(5_usize).build().unwrap();
        assert!(format!("{:?}", job).contains("has_hooks: false"));
    }

    #[test]
    fn typed_ids_round_trip_through_builder() {
        let job = Job::builder(noop).id(7_i64).build().unwrap();
        assert_eq!(job.id(), &JobId::Int(7));
        let job = Job::builder(noop).id(true).build().unwrap();
        assert_eq!(job.id(), &JobId::Bool(true));
    }

    #[test]
    fn success_rate_without_jobs_is_one() {
        let metrics = PoolMetrics::default();
        assert_eq!(metrics.success_rate(), 1.0);

        let metrics = PoolMetrics { completed_jobs: 3, failed_jobs: 1, ..Default::default() };
        assert_eq!(metrics.success_rate(), 0.75);
    }
}
