use serde_json::json;
use std::{sync::Arc, time::{Duration, Instant}};
use tokio::runtime::Builder;
use workpool::{logging, Config, Job, JobError, PoolError, PoolResult, ThreadPool};


fn main() -> PoolResult<()> {
    logging::init("info");

    let rt = Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .map_err(|e| PoolError::Spawn(e.to_string()))?;

    rt.block_on(async {
        let now = Instant::now();
        let config = Config::io_bound().with_poll_timeout(Duration::from_millis(100));
        let pool = Arc::new(ThreadPool::new(config)?);
        pool.start()?;

        const JOBS: i64 = 100_000;
        for i in 0..JOBS {
            let job = Job::builder(|args, _| {
                let n = args.first().and_then(|v| v.as_i64()).ok_or_else(|| JobError::msg("missing argument"))?;
                Ok(json!(n * n))
            })
            .id(i)
            .arg(i)
            .build()?;
            pool.request_queue().put(job)?;
        }

        let mut failed = 0;
        for _ in 0..JOBS {
            if !pool.result_queue().get()?.status() {
                failed += 1;
            }
        }

        pool.stop_async().await?;
        let metrics = pool.metrics();
        println!(
            "elapsed: {:?}, completed: {}, failed: {}",
            now.elapsed(),
            metrics.completed_jobs,
            failed
        );
        Ok::<(), PoolError>(())
    })
}
