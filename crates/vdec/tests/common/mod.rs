#![allow(dead_code)]

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use vdec::prelude::*;

pub const WAIT: Duration = Duration::from_secs(5);

/// A device wired to simulated platform backends that tests can inspect.
pub struct Rig {
    pub regs: Arc<RecordingRegisters>,
    pub coherent: Arc<SimCoherent>,
    pub power: Arc<SimPower>,
    pub pool: Arc<SimPool>,
    pub live: Arc<SimDomain>,
    pub empty: Arc<SimDomain>,
    pub device: Device,
}

impl Rig {
    /// Translated device with a 4 MiB fast pool.
    pub fn new() -> Self {
        Self::build(Some(0x40_0000), true)
    }

    pub fn build(pool_bytes: Option<u64>, translated: bool) -> Self {
        let regs = Arc::new(RecordingRegisters::default());
        let coherent = Arc::new(SimCoherent::new(0x8000_0000));
        let power = Arc::new(SimPower::default());
        let events = DomainEventLog::default();
        let live = Arc::new(SimDomain::with_event_log("live", 0x1000, events.clone()));
        let empty = Arc::new(SimDomain::with_event_log("empty", 0x1000, events));
        let pool = Arc::new(SimPool::new(
            0x4000_0000,
            0xff00_0000,
            pool_bytes.unwrap_or(0),
        ));

        // The timer never fires by itself; tests expire it explicitly.
        let tunables = VdecConfig::new().watchdog_timeout_ms(60_000).tunables();
        let mut builder = DeviceBuilder::new(regs.clone(), coherent.clone(), power.clone())
            .tunables(tunables);
        if translated {
            builder = builder.translation(live.clone()).empty_domain(empty.clone());
        }
        if pool_bytes.is_some() {
            builder = builder.fast_pool(pool.clone());
        }
        let device = builder.build().expect("device");
        Self {
            regs,
            coherent,
            power,
            pool,
            live,
            empty,
            device,
        }
    }

    /// Stage an interrupt status word and run the interrupt entry point.
    pub fn raise_interrupt(&self, status: u32) -> bool {
        self.regs.poke(vdec::regs::REG_STA_INT, status);
        self.device.handle_interrupt()
    }

    pub fn wait_running(&self) -> JobId {
        assert!(
            self.device.wait_for_state(JobState::Running, WAIT),
            "no job started"
        );
        self.device.current_job().expect("running job")
    }
}

pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}

pub fn sps(width: u32, height: u32) -> H264Sps {
    H264Sps {
        chroma_format_idc: 1,
        pic_width_in_mbs_minus1: (width / 16 - 1) as u16,
        pic_height_in_map_units_minus1: (height / 16 - 1) as u16,
        flags: H264Sps::FLAG_FRAME_MBS_ONLY,
        ..H264Sps::default()
    }
}

/// Negotiate `width` x `height`, allocate buffers and start both queues.
pub fn start_stream(session: &Session, width: u32, height: u32, buffers: u32) {
    session
        .set_output_format(&PixFormat::new(FourCc::H264_SLICE, width, height))
        .expect("coded format");
    session
        .request_buffers(Direction::Source, buffers)
        .expect("source buffers");
    session
        .request_buffers(Direction::Destination, buffers)
        .expect("destination buffers");
    session.stream_on(Direction::Source).expect("stream on source");
    session
        .stream_on(Direction::Destination)
        .expect("stream on destination");
}

pub fn destination(session: &Session, index: u32) -> VideoBuffer {
    let size = session.decoded_format().plane_size(0);
    VideoBuffer::new(index, Direction::Destination).with_plane(
        0x1000_0000 + u64::from(index) * 0x100_0000,
        size,
        0,
    )
}

pub fn frame_request(session: &Session, id: RequestId, index: u32, bytesused: u64) -> Request {
    let coded = session.output_format();
    let mut src = VideoBuffer::new(index, Direction::Source).with_plane(
        0x2000_0000 + u64::from(index) * 0x100_0000,
        coded.plane_size(0),
        bytesused,
    );
    src.timestamp = id * 1_000;
    Request::new(id)
        .control(
            ControlId::H264_SPS,
            ControlValue::H264Sps(sps(coded.width, coded.height)),
        )
        .buffer(src)
}

/// Queue one destination buffer and one coded frame at `index`.
pub fn queue_frame(session: &Session, id: RequestId, index: u32) {
    session
        .queue_buffer(destination(session, index))
        .expect("queue destination");
    session
        .queue_request(frame_request(session, id, index, 4096))
        .expect("queue request");
}
