use crate::bus::{DomainEvent, Publisher};
use crate::error::QueueError;
use crate::queue::Queue;
use crate::store::Store;
use crate::types::Job;

/// C8 Cancellation - rejects jobs already in a terminal state, marks the job
/// `CANCELLED`, drains every queue item still pointing at it, and publishes
/// the final event. `reference_count` on the job's articles is left alone:
/// it tracks how many jobs have ever depended on an article, and cancelling
/// one of those jobs doesn't undo that dependency having existed.
/// Returns the now-cancelled Job alongside the count of queue items removed
/// on its behalf - the "removed-task count" the `DELETE /jobs/{id}` surface
/// reports back to the caller.
pub async fn cancel_job(
    store: &Store,
    queue: &Queue,
    publisher: &Publisher,
    job_id: &str,
) -> Result<(Job, u64), QueueError> {
    let job = store.cancel_job(job_id).await?;
    let drained = queue.drain_matching_job(job_id).await?;

    publisher
        .publish(&DomainEvent::JobCancelled {
            job_id: job.id.clone(),
        })
        .await?;

    common_metrics::inc(crate::metrics::JOB_CANCELLED, &[], 1);

    Ok((job, drained))
}
