mod common;

use common::{Rig, WAIT, queue_frame};
use vdec::{prelude::*, regs};

fn coded_1080p(session: &Session) {
    session
        .set_output_format(&PixFormat::new(FourCc::H264_SLICE, 1920, 1080))
        .expect("coded format");
}

#[test]
fn stream_on_places_scratch_in_the_translated_pool() {
    let rig = Rig::new();
    let session = rig.device.open_session();
    coded_1080p(&session);
    let decoded = session.decoded_format();
    session.stream_on(Direction::Source).expect("stream on");

    let scratch = session.scratch_buffers();
    assert_eq!(scratch.len(), RCB_COUNT);
    for buf in &scratch {
        assert!(buf.in_fast_pool(), "{:?} fell back", buf.purpose);
        assert_eq!(buf.size % 0x1000, 0);
        assert!(buf.size >= buf.purpose.size_for(decoded.width, decoded.height));
        let Backing::FastPool { block, translated } = buf.backing else {
            panic!("{:?} is not pool backed", buf.purpose);
        };
        assert!(translated);
        assert_eq!(buf.dma_addr, block.cpu_addr);
        let mapping = rig.live.mapping(buf.dma_addr).expect("mapped");
        assert_eq!(mapping.phys, block.dma_addr);
        assert_eq!(mapping.size, buf.size);
    }
    assert_eq!(rig.live.mapping_count(), RCB_COUNT);
    assert_eq!(rig.device.metrics().fast_pool_hits, RCB_COUNT as u64);

    session.stream_off(Direction::Source).expect("stream off");
    assert!(session.scratch_buffers().is_empty());
    assert_eq!(rig.pool.live_blocks(), 0);
    assert_eq!(rig.live.mapping_count(), 0);
    assert_eq!(rig.coherent.live_blocks(), 0);
}

#[test]
fn untranslated_pool_hands_out_bus_addresses() {
    let rig = Rig::build(Some(0x40_0000), false);
    let session = rig.device.open_session();
    coded_1080p(&session);
    let decoded = session.decoded_format();
    session.stream_on(Direction::Source).expect("stream on");

    for buf in session.scratch_buffers() {
        let Backing::FastPool { block, translated } = buf.backing else {
            panic!("{:?} is not pool backed", buf.purpose);
        };
        assert!(!translated);
        assert_eq!(buf.dma_addr, block.dma_addr);
        assert_eq!(buf.size, buf.purpose.size_for(decoded.width, decoded.height));
    }
    assert_eq!(rig.live.mapping_count(), 0);
}

#[test]
fn map_failure_falls_back_to_coherent_memory() {
    let rig = Rig::new();
    let session = rig.device.open_session();
    coded_1080p(&session);
    let decoded = session.decoded_format();
    rig.live.fail_next_maps(1);
    session.stream_on(Direction::Source).expect("stream on");

    let scratch = session.scratch_buffers();
    let first = scratch[0];
    assert_eq!(first.purpose, RcbPurpose::IntraRow);
    assert!(!first.in_fast_pool());
    // Coherent fallbacks keep the exact size.
    assert_eq!(first.size, RcbPurpose::IntraRow.size_for(decoded.width, decoded.height));
    assert!(matches!(first.backing, Backing::Coherent(_)));
    assert!(scratch[1..].iter().all(ScratchBuffer::in_fast_pool));
    assert_eq!(rig.pool.live_blocks(), RCB_COUNT - 1);

    let metrics = rig.device.metrics();
    assert_eq!(metrics.fast_pool_fallbacks, 1);
    assert_eq!(metrics.fast_pool_hits, (RCB_COUNT - 1) as u64);
}

#[test]
fn exhausted_memory_fails_stream_on_without_leaks() {
    let rig = Rig::build(None, true);
    let session = rig.device.open_session();
    coded_1080p(&session);
    rig.coherent.fail_after(3);

    let err = session.stream_on(Direction::Source).unwrap_err();
    assert!(matches!(err, DecodeError::OutOfMemory { what: "scratch buffer", .. }));
    assert!(session.scratch_buffers().is_empty());
    assert!(!session.is_streaming(Direction::Source));
    assert_eq!(rig.coherent.live_blocks(), 0);
    // Without a pool nothing counts as a fallback.
    assert_eq!(rig.device.metrics().fast_pool_fallbacks, 0);

    rig.coherent.unlimited();
    session.stream_on(Direction::Source).expect("stream on");
    // Ten scratch buffers plus the codec's private table.
    assert_eq!(rig.coherent.live_blocks(), RCB_COUNT + 1);
}

#[test]
fn codec_start_failure_releases_scratch() {
    let rig = Rig::build(None, true);
    let session = rig.device.open_session();
    coded_1080p(&session);
    rig.coherent.fail_after(RCB_COUNT);

    let err = session.stream_on(Direction::Source).unwrap_err();
    assert!(matches!(err, DecodeError::OutOfMemory { what: "h264 private table", .. }));
    assert!(session.scratch_buffers().is_empty());
    assert_eq!(rig.coherent.live_blocks(), 0);
}

#[test]
fn scratch_addresses_are_programmed_per_job() {
    let rig = Rig::new();
    let session = rig.device.open_session();
    common::start_stream(&session, 64, 64, 1);
    queue_frame(&session, 1, 0);
    rig.wait_running();

    for buf in session.scratch_buffers() {
        let index = buf.purpose.index();
        assert_eq!(
            rig.regs.writes_to(regs::rcb_addr_reg(index)),
            vec![buf.dma_addr as u32]
        );
        assert_eq!(
            rig.regs.writes_to(regs::rcb_size_reg(index)),
            vec![buf.size as u32]
        );
    }

    assert!(rig.raise_interrupt(regs::STA_INT_DEC_RDY_STA));
    session
        .dequeue_buffer_timeout(Direction::Destination, WAIT)
        .expect("decoded buffer");
}
