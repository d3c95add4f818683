mod common;

use std::{
    sync::Barrier,
    thread,
    time::Duration,
};

use common::{Rig, WAIT, frame_request, queue_frame, start_stream, wait_until};
use vdec::{prelude::*, regs};

#[test]
fn interrupt_completes_job_and_copies_metadata() {
    let rig = Rig::new();
    let session = rig.device.open_session();
    start_stream(&session, 64, 64, 2);
    queue_frame(&session, 11, 0);

    rig.wait_running();
    assert_eq!(rig.regs.writes_to(regs::REG_DEC_E), vec![regs::DEC_E_START]);
    assert!(rig.raise_interrupt(regs::STA_INT_DEC_RDY_STA));

    let dst = session
        .dequeue_buffer_timeout(Direction::Destination, WAIT)
        .expect("decoded buffer");
    let src = session
        .dequeue_buffer(Direction::Source)
        .expect("coded buffer");
    assert_eq!(dst.state, BufferState::Done);
    assert_eq!(src.state, BufferState::Done);
    assert_eq!(dst.timestamp, 11_000);
    assert_eq!(dst.field, Field::None);
    assert_eq!(dst.bytesused(0), session.decoded_format().plane_size(0));

    assert!(rig.device.wait_for_state(JobState::Idle, WAIT));
    assert_eq!(session.take_completed_requests(), vec![11]);
    assert_eq!(rig.regs.read(regs::REG_STA_INT), 0);
    assert_eq!(rig.power.usage(), 0);
    assert_eq!(rig.power.busy_marks(), 1);
    assert!(rig.live.events().is_empty());

    let metrics = rig.device.metrics();
    assert_eq!((metrics.dispatched, metrics.completed, metrics.failed), (1, 1, 0));
}

#[test]
fn error_interrupt_fails_job_and_restores_translation() {
    let rig = Rig::new();
    let session = rig.device.open_session();
    start_stream(&session, 64, 64, 1);
    queue_frame(&session, 1, 0);

    rig.wait_running();
    assert!(rig.raise_interrupt(regs::STA_INT_ERROR));
    let dst = session
        .dequeue_buffer_timeout(Direction::Destination, WAIT)
        .expect("decoded buffer");
    assert_eq!(dst.state, BufferState::Error);
    assert!(dst.flags.contains(BufferFlags::ERROR));
    assert_eq!(
        rig.live.events(),
        vec![
            DomainEvent::Attach("empty".into()),
            DomainEvent::Detach("empty".into()),
            DomainEvent::Attach("live".into()),
        ]
    );
    assert!(rig.device.wait_for_state(JobState::Idle, WAIT));
    let metrics = rig.device.metrics();
    assert_eq!((metrics.failed, metrics.recoveries), (1, 1));
}

#[test]
fn soft_reset_ready_recovers_even_on_success() {
    let rig = Rig::new();
    let session = rig.device.open_session();
    start_stream(&session, 64, 64, 1);
    queue_frame(&session, 1, 0);

    rig.wait_running();
    assert!(rig.raise_interrupt(regs::STA_INT_DEC_RDY_STA | regs::STA_INT_SOFTRESET_RDY));
    let dst = session
        .dequeue_buffer_timeout(Direction::Destination, WAIT)
        .expect("decoded buffer");
    assert_eq!(dst.state, BufferState::Done);
    assert_eq!(rig.device.metrics().recoveries, 1);
}

#[test]
fn interrupt_without_a_job_is_ignored() {
    let rig = Rig::new();
    assert!(!rig.raise_interrupt(regs::STA_INT_DEC_RDY_STA));
    assert_eq!(rig.regs.read(regs::REG_STA_INT), 0);
    assert_eq!(rig.device.metrics().completed, 0);
}

#[test]
fn stray_error_interrupt_leaves_translation_alone() {
    let rig = Rig::new();
    assert!(!rig.raise_interrupt(regs::STA_INT_ERROR));
    assert!(!rig.raise_interrupt(regs::STA_INT_SOFTRESET_RDY));
    assert_eq!(rig.regs.read(regs::REG_STA_INT), 0);
    assert!(rig.live.events().is_empty());
    let metrics = rig.device.metrics();
    assert_eq!((metrics.recoveries, metrics.failed), (0, 0));
}

#[test]
fn watchdog_expiry_disables_interrupts_and_ignores_late_interrupt() {
    let rig = Rig::new();
    let session = rig.device.open_session();
    start_stream(&session, 64, 64, 1);
    queue_frame(&session, 5, 0);

    rig.wait_running();
    rig.regs.clear_log();
    assert!(rig.device.expire_watchdog());
    let writes = rig.regs.writes();
    assert_eq!(
        &writes[..2],
        &[(regs::REG_IMPORTANT_EN, regs::DEC_IRQ_DISABLE), (regs::REG_DEC_E, 0)]
    );
    // The status register is never consulted on the hang path.
    assert!(rig.regs.writes_to(regs::REG_STA_INT).is_empty());

    let dst = session
        .dequeue_buffer_timeout(Direction::Destination, WAIT)
        .expect("decoded buffer");
    assert_eq!(dst.state, BufferState::Error);
    assert!(rig.device.wait_for_state(JobState::Idle, WAIT));

    assert!(!rig.raise_interrupt(regs::STA_INT_DEC_RDY_STA));
    assert!(session.dequeue_buffer(Direction::Destination).is_none());
    let metrics = rig.device.metrics();
    assert_eq!((metrics.hangs, metrics.completed, metrics.recoveries), (1, 1, 1));
    assert_eq!(session.take_completed_requests(), vec![5]);
}

#[test]
fn next_job_runs_after_a_hang() {
    let rig = Rig::new();
    let session = rig.device.open_session();
    start_stream(&session, 64, 64, 2);
    queue_frame(&session, 1, 0);
    queue_frame(&session, 2, 1);

    let hung = rig.wait_running();
    assert!(rig.device.expire_watchdog());
    assert!(wait_until(|| {
        rig.device.scheduler_state() == JobState::Running
            && rig.device.current_job().is_some_and(|job| job != hung)
    }));
    assert!(rig.raise_interrupt(regs::STA_INT_DEC_RDY_STA));

    let first = session
        .dequeue_buffer_timeout(Direction::Destination, WAIT)
        .expect("first");
    let second = session
        .dequeue_buffer_timeout(Direction::Destination, WAIT)
        .expect("second");
    assert_eq!((first.index, first.state), (0, BufferState::Error));
    assert_eq!((second.index, second.state), (1, BufferState::Done));
    assert_eq!(second.sequence, first.sequence + 1);
    assert!(rig.device.wait_for_state(JobState::Idle, WAIT));
    assert_eq!(rig.power.usage(), 0);
}

#[test]
fn interrupt_and_watchdog_race_completes_exactly_once() {
    for _ in 0..20 {
        let rig = Rig::new();
        let session = rig.device.open_session();
        start_stream(&session, 64, 64, 1);
        queue_frame(&session, 1, 0);
        rig.wait_running();
        rig.regs.poke(regs::REG_STA_INT, regs::STA_INT_DEC_RDY_STA);

        let barrier = Barrier::new(2);
        let (by_interrupt, by_watchdog) = thread::scope(|s| {
            let irq = s.spawn(|| {
                barrier.wait();
                rig.device.handle_interrupt()
            });
            let dog = s.spawn(|| {
                barrier.wait();
                rig.device.expire_watchdog()
            });
            (
                irq.join().expect("interrupt thread"),
                dog.join().expect("watchdog thread"),
            )
        });
        assert!(by_interrupt ^ by_watchdog);

        let dst = session
            .dequeue_buffer_timeout(Direction::Destination, WAIT)
            .expect("decoded buffer");
        let expected = if by_interrupt {
            BufferState::Done
        } else {
            BufferState::Error
        };
        assert_eq!(dst.state, expected);
        assert!(rig.device.wait_for_state(JobState::Idle, WAIT));
        assert!(session.dequeue_buffer(Direction::Destination).is_none());
        let metrics = rig.device.metrics();
        assert_eq!(metrics.completed, 1);
        assert_eq!(metrics.recoveries, u64::from(by_watchdog));
        assert_eq!(rig.power.usage(), 0);
    }
}

#[test]
fn power_failure_fails_job_without_touching_hardware() {
    let rig = Rig::new();
    let session = rig.device.open_session();
    start_stream(&session, 64, 64, 1);
    rig.power.fail_next_resume();
    queue_frame(&session, 3, 0);

    let dst = session
        .dequeue_buffer_timeout(Direction::Destination, WAIT)
        .expect("decoded buffer");
    assert_eq!(dst.state, BufferState::Error);
    assert!(rig.device.wait_for_state(JobState::Idle, WAIT));
    assert!(rig.regs.writes().is_empty());
    assert_eq!(rig.power.usage(), 0);
    assert_eq!(rig.power.busy_marks(), 0);
    let metrics = rig.device.metrics();
    assert_eq!((metrics.power_failures, metrics.failed), (1, 1));
    assert_eq!(session.take_completed_requests(), vec![3]);
}

#[test]
fn programming_failure_fails_job_and_next_runs() {
    let rig = Rig::new();
    let session = rig.device.open_session();
    start_stream(&session, 64, 64, 2);
    session
        .queue_buffer(common::destination(&session, 0))
        .expect("queue destination");
    // An empty bitstream cannot be programmed.
    session
        .queue_request(frame_request(&session, 1, 0, 0))
        .expect("queue request");

    let dst = session
        .dequeue_buffer_timeout(Direction::Destination, WAIT)
        .expect("decoded buffer");
    assert_eq!(dst.state, BufferState::Error);
    assert!(rig.regs.writes_to(regs::REG_DEC_E).is_empty());
    assert!(rig.device.wait_for_state(JobState::Idle, WAIT));
    assert_eq!(rig.power.usage(), 0);
    assert_eq!(rig.device.metrics().programming_errors, 1);

    queue_frame(&session, 2, 1);
    rig.wait_running();
    assert!(rig.raise_interrupt(regs::STA_INT_DEC_RDY_STA));
    let dst = session
        .dequeue_buffer_timeout(Direction::Destination, WAIT)
        .expect("decoded buffer");
    assert_eq!(dst.state, BufferState::Done);
}

#[test]
fn stream_off_waits_for_the_job_in_flight() {
    let rig = Rig::new();
    let session = rig.device.open_session();
    start_stream(&session, 64, 64, 2);
    queue_frame(&session, 1, 0);
    session
        .queue_buffer(common::destination(&session, 1))
        .expect("spare destination");
    rig.wait_running();

    thread::scope(|s| {
        let stopper = s.spawn(|| session.stream_off(Direction::Source));
        thread::sleep(Duration::from_millis(50));
        assert!(!stopper.is_finished());
        assert!(rig.raise_interrupt(regs::STA_INT_DEC_RDY_STA));
        stopper.join().expect("stopper").expect("stream off");
    });

    assert!(session.scratch_buffers().is_empty());
    assert_eq!(rig.pool.live_blocks(), 0);
    assert_eq!(rig.live.mapping_count(), 0);
    assert!(!session.is_streaming(Direction::Source));

    let done = session
        .dequeue_buffer_timeout(Direction::Destination, WAIT)
        .expect("decoded buffer");
    assert_eq!(done.state, BufferState::Done);
    // The spare destination stays queued until its own queue stops.
    assert!(session.dequeue_buffer(Direction::Destination).is_none());
    session.stream_off(Direction::Destination).expect("stream off");
    let spare = session
        .dequeue_buffer(Direction::Destination)
        .expect("spare returned");
    assert_eq!((spare.index, spare.state), (1, BufferState::Error));
}
