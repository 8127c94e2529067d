// Dispatcher tests: policy selection, dequeue order, cancel routing and SRTF preemption

use std::sync::Arc;

use printflow::printer::SlotJob;
use printflow::{
    CancelOutcome, Dispatcher, JobId, JobState, Policy, PolicyThresholds, PrintJob, Printer,
    PrinterHandle, PrinterId, PrinterTiming, UpdateEvent, UpdateReceiver, update_channel,
};

fn dispatcher() -> (Arc<Dispatcher>, UpdateReceiver) {
    let (updates, receiver) = update_channel();
    (Arc::new(Dispatcher::new(PolicyThresholds::default(), updates)), receiver)
}

fn job(name: &str, pages: u32) -> PrintJob {
    PrintJob::new(name, pages).unwrap()
}

async fn submit_all(dispatcher: &Dispatcher, jobs: &[(&str, u32)]) -> Vec<JobId> {
    let mut ids = Vec::new();
    for (name, pages) in jobs {
        let job = job(name, *pages);
        ids.push(job.id());
        dispatcher.submit(job).await;
    }
    ids
}

/// A registered printer that is not running; the test drives its published slot.
async fn parked_printer(dispatcher: &Arc<Dispatcher>, id: u32) -> (Printer, PrinterHandle) {
    let (updates, _) = update_channel();
    let (printer, handle) = Printer::new(
        PrinterId(id),
        format!("Printer {}", id),
        dispatcher.clone(),
        updates,
        PrinterTiming::default(),
    );
    dispatcher.register_printer(handle.clone()).await;
    (printer, handle)
}

async fn set_printing(handle: &PrinterHandle, remaining_pages: u32) -> JobId {
    let id = JobId::new();
    let mut slot = handle.slot().lock().await;
    slot.current = Some(SlotJob { id, remaining_pages });
    id
}

fn algorithm_changes(events: &[UpdateEvent]) -> Vec<Policy> {
    events
        .iter()
        .filter_map(|event| match event {
            UpdateEvent::AlgorithmChanged(policy) => Some(*policy),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_fcfs_dequeues_in_arrival_order() {
    let (dispatcher, _rx) = dispatcher();
    submit_all(&dispatcher, &[("a.pdf", 30), ("b.pdf", 1), ("c.pdf", 10)]).await;
    assert_eq!(dispatcher.policy().await, Policy::Fcfs);

    let names: Vec<String> = [
        dispatcher.request_next_job(PrinterId(1)).await,
        dispatcher.request_next_job(PrinterId(1)).await,
        dispatcher.request_next_job(PrinterId(1)).await,
    ]
    .into_iter()
    .map(|job| job.unwrap().name().to_string())
    .collect();
    assert_eq!(names, vec!["a.pdf", "b.pdf", "c.pdf"]);
    assert!(dispatcher.request_next_job(PrinterId(1)).await.is_none());
}

#[tokio::test]
async fn test_long_queue_switches_to_sjf_and_short_job_goes_first() {
    let (dispatcher, mut rx) = dispatcher();
    submit_all(
        &dispatcher,
        &[("a.pdf", 50), ("b.pdf", 50), ("c.pdf", 50), ("d.pdf", 50), ("e.pdf", 50)],
    )
    .await;
    assert_eq!(dispatcher.policy().await, Policy::Sjf);
    assert_eq!(algorithm_changes(&rx.drain()), vec![Policy::Sjf]);

    submit_all(&dispatcher, &[("short.pdf", 5)]).await;
    let next = dispatcher.request_next_job(PrinterId(1)).await.unwrap();
    assert_eq!(next.name(), "short.pdf");
    // Equal lengths fall back to arrival order.
    assert_eq!(dispatcher.request_next_job(PrinterId(1)).await.unwrap().name(), "a.pdf");
}

#[tokio::test]
async fn test_policy_boundaries() {
    let (dispatcher, mut rx) = dispatcher();
    submit_all(&dispatcher, &[("a", 20), ("b", 20), ("c", 20)]).await;
    assert_eq!(dispatcher.policy().await, Policy::Fcfs);

    submit_all(&dispatcher, &[("d", 20)]).await;
    assert_eq!(dispatcher.policy().await, Policy::Srtf);

    // Mean goes from 20 to 20.2 with a 21-page job.
    submit_all(&dispatcher, &[("e", 21)]).await;
    assert_eq!(dispatcher.policy().await, Policy::Sjf);

    assert_eq!(algorithm_changes(&rx.drain()), vec![Policy::Srtf, Policy::Sjf]);
}

#[tokio::test]
async fn test_policy_reverts_to_fcfs_as_queue_drains() {
    let (dispatcher, _rx) = dispatcher();
    submit_all(&dispatcher, &[("a", 2), ("b", 2), ("c", 2), ("d", 2)]).await;
    assert_eq!(dispatcher.policy().await, Policy::Srtf);
    dispatcher.request_next_job(PrinterId(1)).await.unwrap();
    assert_eq!(dispatcher.policy().await, Policy::Fcfs);
}

#[tokio::test]
async fn test_requeue_goes_to_head_with_progress() {
    let (dispatcher, _rx) = dispatcher();
    submit_all(&dispatcher, &[("first.pdf", 3), ("second.pdf", 3)]).await;

    let mut taken = dispatcher.request_next_job(PrinterId(1)).await.unwrap();
    taken.transition(JobState::Printing).unwrap();
    taken.advance_page().unwrap();
    taken.transition(JobState::Preempted).unwrap();
    dispatcher.requeue(taken).await;

    let snapshot = dispatcher.queue_snapshot().await;
    assert_eq!(snapshot[0].name, "first.pdf");
    assert_eq!(snapshot[0].state, JobState::Preempted);
    assert_eq!(snapshot[0].remaining_pages, 2);
    assert_eq!(snapshot[0].completed_pages, 1);
}

#[tokio::test]
async fn test_requeue_refuses_finished_jobs() {
    let (dispatcher, _rx) = dispatcher();
    let mut done = job("done.pdf", 1);
    done.transition(JobState::Printing).unwrap();
    done.advance_page().unwrap();
    done.transition(JobState::Completed).unwrap();
    dispatcher.requeue(done).await;
    assert_eq!(dispatcher.pending_len().await, 0);
}

#[tokio::test]
async fn test_resubmit_goes_to_tail_without_preempting() {
    let (dispatcher, _rx) = dispatcher();
    let (_printer, handle) = parked_printer(&dispatcher, 5).await;
    set_printing(&handle, 40).await;
    submit_all(&dispatcher, &[("a", 10), ("b", 10), ("c", 10), ("d", 10)]).await;
    assert_eq!(dispatcher.policy().await, Policy::Srtf);

    let unstarted = job("unstarted.pdf", 2);
    let unstarted_id = unstarted.id();
    dispatcher.resubmit(unstarted).await;

    let snapshot = dispatcher.queue_snapshot().await;
    assert_eq!(snapshot.len(), 5);
    assert_eq!(snapshot[4].id, unstarted_id);
    assert_eq!(snapshot[4].state, JobState::Queued);
    assert_eq!(handle.slot().lock().await.preempting, None);

    let mut canceled = job("canceled.pdf", 2);
    canceled.transition(JobState::Canceled).unwrap();
    dispatcher.resubmit(canceled).await;
    assert_eq!(dispatcher.pending_len().await, 5);
}

#[tokio::test]
async fn test_cancel_pending_job_removes_it() {
    let (dispatcher, mut rx) = dispatcher();
    let ids = submit_all(&dispatcher, &[("keep.pdf", 4), ("drop.pdf", 4)]).await;
    rx.drain();

    assert_eq!(dispatcher.cancel(ids[1]).await, CancelOutcome::Removed);
    let events = rx.drain();
    let finished = events.iter().find_map(|event| match event {
        UpdateEvent::JobFinished { printer, job } => Some((*printer, job.clone())),
        _ => None,
    });
    let (printer, snapshot) = finished.expect("cancel should report the finished job");
    assert_eq!(printer, None);
    assert_eq!(snapshot.id, ids[1]);
    assert_eq!(snapshot.state, JobState::Canceled);

    submit_all(&dispatcher, &[("later.pdf", 1)]).await;
    for event in rx.drain() {
        if let UpdateEvent::QueueSnapshot(queue) = event {
            assert!(queue.iter().all(|job| job.id != ids[1]));
        }
    }
    assert_eq!(dispatcher.cancel(ids[1]).await, CancelOutcome::NotFound);
}

#[tokio::test]
async fn test_cancel_unknown_job_is_not_found() {
    let (dispatcher, _rx) = dispatcher();
    assert_eq!(dispatcher.cancel(JobId::new()).await, CancelOutcome::NotFound);
}

#[tokio::test]
async fn test_cancel_routes_to_holding_printer() {
    let (dispatcher, _rx) = dispatcher();
    let (_printer, handle) = parked_printer(&dispatcher, 7).await;
    let held = set_printing(&handle, 12).await;
    assert_eq!(dispatcher.cancel(held).await, CancelOutcome::Signaled(PrinterId(7)));
}

#[tokio::test]
async fn test_request_next_job_publishes_slot() {
    let (dispatcher, _rx) = dispatcher();
    let (_printer, handle) = parked_printer(&dispatcher, 1).await;
    let ids = submit_all(&dispatcher, &[("a.pdf", 9)]).await;

    let job = dispatcher.request_next_job(PrinterId(1)).await.unwrap();
    let slot = handle.slot().lock().await.clone();
    assert_eq!(slot.current, Some(SlotJob { id: ids[0], remaining_pages: 9 }));
    assert_eq!(job.id(), ids[0]);
}

#[tokio::test]
async fn test_srtf_preempts_printer_with_most_remaining() {
    let (dispatcher, _rx) = dispatcher();
    let (_p1, first) = parked_printer(&dispatcher, 1).await;
    let (_p2, second) = parked_printer(&dispatcher, 2).await;
    set_printing(&first, 30).await;
    set_printing(&second, 45).await;

    submit_all(&dispatcher, &[("a", 10), ("b", 10), ("c", 10), ("d", 10)]).await;
    assert_eq!(dispatcher.policy().await, Policy::Srtf);

    let urgent = submit_all(&dispatcher, &[("urgent.pdf", 2)]).await[0];
    assert_eq!(second.slot().lock().await.preempting, Some(urgent));
    assert_eq!(first.slot().lock().await.preempting, None);
    let queue = dispatcher.queue_snapshot().await;
    assert_eq!(queue.len(), 4);
    assert!(queue.iter().all(|job| job.id != urgent));

    // The second printer already has a payload; the next short job goes to the first.
    let next = submit_all(&dispatcher, &[("urgent2.pdf", 3)]).await[0];
    assert_eq!(first.slot().lock().await.preempting, Some(next));
    assert_eq!(second.slot().lock().await.preempting, Some(urgent));
}

#[tokio::test]
async fn test_srtf_requires_strictly_fewer_pages() {
    let (dispatcher, _rx) = dispatcher();
    let (_printer, handle) = parked_printer(&dispatcher, 1).await;
    set_printing(&handle, 10).await;
    submit_all(&dispatcher, &[("a", 5), ("b", 5), ("c", 5), ("d", 5)]).await;
    assert_eq!(dispatcher.policy().await, Policy::Srtf);

    submit_all(&dispatcher, &[("same.pdf", 10)]).await;
    assert_eq!(handle.slot().lock().await.preempting, None);
    assert_eq!(dispatcher.pending_len().await, 5);

    let shorter = submit_all(&dispatcher, &[("shorter.pdf", 9)]).await[0];
    assert_eq!(handle.slot().lock().await.preempting, Some(shorter));
}

#[tokio::test]
async fn test_srtf_skips_paused_printers() {
    let (dispatcher, _rx) = dispatcher();
    let (_printer, handle) = parked_printer(&dispatcher, 1).await;
    set_printing(&handle, 80).await;
    handle.slot().lock().await.paused = true;
    submit_all(&dispatcher, &[("a", 5), ("b", 5), ("c", 5), ("d", 5)]).await;

    submit_all(&dispatcher, &[("tiny.pdf", 1)]).await;
    assert_eq!(handle.slot().lock().await.preempting, None);
    assert_eq!(dispatcher.pending_len().await, 5);
}

#[tokio::test]
async fn test_no_preemption_outside_srtf() {
    let (dispatcher, _rx) = dispatcher();
    let (_printer, handle) = parked_printer(&dispatcher, 1).await;
    set_printing(&handle, 100).await;
    submit_all(&dispatcher, &[("a", 50), ("b", 50), ("c", 50), ("d", 50)]).await;
    assert_eq!(dispatcher.policy().await, Policy::Sjf);

    submit_all(&dispatcher, &[("tiny.pdf", 1)]).await;
    assert_eq!(handle.slot().lock().await.preempting, None);
}

#[tokio::test]
async fn test_preemption_payload_can_be_canceled() {
    let (dispatcher, _rx) = dispatcher();
    let (_printer, handle) = parked_printer(&dispatcher, 3).await;
    set_printing(&handle, 40).await;
    submit_all(&dispatcher, &[("a", 10), ("b", 10), ("c", 10), ("d", 10)]).await;
    let urgent = submit_all(&dispatcher, &[("urgent.pdf", 2)]).await[0];

    assert_eq!(dispatcher.cancel(urgent).await, CancelOutcome::Signaled(PrinterId(3)));
}

#[tokio::test]
async fn test_unregister_printer() {
    let (dispatcher, _rx) = dispatcher();
    let (_printer, _handle) = parked_printer(&dispatcher, 4).await;
    assert_eq!(dispatcher.printer_ids().await, vec![PrinterId(4)]);
    assert!(dispatcher.unregister_printer(PrinterId(4)).await);
    assert!(!dispatcher.unregister_printer(PrinterId(4)).await);
    assert!(dispatcher.printer_ids().await.is_empty());
}
