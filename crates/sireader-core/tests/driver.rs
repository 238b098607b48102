//! Driver loop scenarios against a scripted master station

use pretty_assertions::assert_eq;
use sireader_core::dataframe::CardDataFrame;
use sireader_core::driver::{
    CommStatus, CommWriter, DriverExit, MessageQueue, MessageSender, SiDriver, SiHandler,
};
use sireader_core::link::attach;
use sireader_core::protocol::commands::*;
use sireader_core::protocol::frame::encode_frame;
use sireader_core::protocol::{Message, ProtocolError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Status(CommStatus),
    Data(&'static str, usize),
    Error(CommStatus, String),
}

/// Handler recording events into a shared log
#[derive(Clone, Default)]
struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn statuses(&self) -> Vec<CommStatus> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Status(s) | Event::Error(s, _) => Some(s),
                Event::Data(..) => None,
            })
            .collect()
    }
}

impl SiHandler for Recorder {
    fn notify(&mut self, status: CommStatus) {
        self.events.lock().unwrap().push(Event::Status(status));
    }

    fn notify_data(&mut self, frame: CardDataFrame) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Data(frame.series(), frame.blocks().len()));
    }

    fn notify_error(&mut self, status: CommStatus, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Error(status, message.to_string()));
    }
}

#[derive(Clone, Default)]
struct Wire {
    written: Arc<Mutex<Vec<Message>>>,
    fail: bool,
}

impl Wire {
    fn written(&self) -> Vec<Message> {
        self.written.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CommWriter for Wire {
    async fn write(&mut self, message: &Message) -> Result<(), ProtocolError> {
        if self.fail {
            return Err(ProtocolError::IoError(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "port closed",
            )));
        }
        self.written.lock().unwrap().push(message.clone());
        Ok(())
    }
}

fn startup_answer() -> Message {
    Message::new(SET_MASTER_MODE, vec![0x00, 0x01, DIRECT_MODE])
}

fn config_answer() -> Message {
    Message::new(GET_SYSTEM_VALUE, vec![0x00, 0x01, CONFIG_PROTOCOL_OFFSET, 0x05])
}

fn no_ext_protocol_answer() -> Message {
    Message::new(GET_SYSTEM_VALUE, vec![0x00, 0x01, CONFIG_PROTOCOL_OFFSET, 0x04])
}

fn sicard5_detected() -> Message {
    Message::new(SI_CARD_5_DETECTED, vec![0x00, 0x01, 0x00, 0x04, 0x19, 0x02])
}

fn sicard5_data() -> Message {
    Message::new(GET_SI_CARD_5, vec![0x55; 130])
}

fn sicard8_detected() -> Message {
    Message::new(SI_CARD_8_PLUS_DETECTED, vec![0x00, 0x01, 0x02, 0x1E, 0x84, 0x80])
}

fn sicard8_block(block: u8) -> Message {
    let mut data = vec![0x00, 0x01, block];
    data.extend_from_slice(&[0xEE; 128]);
    Message::new(GET_SI_CARD_8_PLUS, data)
}

fn sicard_removed() -> Message {
    Message::new(SI_CARD_REMOVED, vec![0x00, 0x01, 0x00, 0x04, 0x19, 0x02])
}

struct Station {
    queue: MessageQueue,
    wire: Wire,
    recorder: Recorder,
}

struct Rig {
    driver: SiDriver<Wire, Recorder>,
    wire: Wire,
    recorder: Recorder,
    sender: MessageSender,
}

impl Station {
    async fn with_answers(answers: Vec<Message>) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let queue = MessageQueue::new(16, Duration::from_secs(1));
        for answer in answers {
            queue.add(answer).await.unwrap();
        }
        Self {
            queue,
            wire: Wire::default(),
            recorder: Recorder::default(),
        }
    }

    fn rig(self) -> Rig {
        Rig {
            wire: self.wire.clone(),
            recorder: self.recorder.clone(),
            sender: self.queue.sender(),
            driver: SiDriver::new(self.queue, self.wire, self.recorder),
        }
    }
}

/// Let the driver run until it is idle waiting for the next frame
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test(start_paused = true)]
async fn startup_protocol_succeeds() {
    let station = Station::with_answers(vec![startup_answer(), config_answer()]).await;
    let Rig {
        driver,
        wire,
        recorder,
        ..
    } = station.rig();
    let handle = driver.start();
    settle().await;

    assert_eq!(
        recorder.statuses(),
        vec![CommStatus::Starting, CommStatus::On, CommStatus::Ready]
    );
    assert_eq!(
        wire.written(),
        vec![startup_sequence(), get_protocol_configuration(), beep_twice()]
    );

    assert_eq!(handle.stop().await, DriverExit::Stopped);
    assert_eq!(
        recorder.statuses(),
        vec![CommStatus::Starting, CommStatus::On, CommStatus::Ready]
    );
}

#[tokio::test(start_paused = true)]
async fn startup_protocol_fails_on_timeout() {
    let station = Station::with_answers(Vec::new()).await;
    let Rig {
        driver, recorder, ..
    } = station.rig();
    let exit = driver.run().await;

    let status = "Master station did not answer to startup sequence (high/low baud)";
    assert_eq!(exit, DriverExit::Failed(status.to_string()));
    assert_eq!(
        recorder.events(),
        vec![
            Event::Status(CommStatus::Starting),
            Event::Error(CommStatus::FatalError, status.to_string()),
            Event::Status(CommStatus::Off),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn startup_protocol_fails_on_invalid_answer() {
    let station = Station::with_answers(vec![sicard_removed()]).await;
    let Rig {
        driver, recorder, ..
    } = station.rig();
    let exit = driver.run().await;

    assert!(matches!(exit, DriverExit::Failed(ref m) if m.contains("Invalid message")));
    assert_eq!(
        recorder.statuses(),
        vec![CommStatus::Starting, CommStatus::FatalError, CommStatus::Off]
    );
}

#[tokio::test(start_paused = true)]
async fn startup_protocol_fails_on_extended_protocol_check() {
    let station = Station::with_answers(vec![startup_answer(), no_ext_protocol_answer()]).await;
    let Rig {
        driver,
        wire,
        recorder,
        ..
    } = station.rig();
    let exit = driver.run().await;

    let status = "Master station should be configured with extended protocol";
    assert_eq!(exit, DriverExit::Failed(status.to_string()));
    assert_eq!(
        recorder.events(),
        vec![
            Event::Status(CommStatus::Starting),
            Event::Error(CommStatus::FatalError, status.to_string()),
            Event::Status(CommStatus::Off),
        ]
    );
    assert!(!wire.written().contains(&beep_twice()));
}

#[tokio::test(start_paused = true)]
async fn reads_sicard_5() {
    let station = Station::with_answers(vec![
        startup_answer(),
        config_answer(),
        sicard5_detected(),
        sicard5_data(),
    ])
    .await;
    let Rig {
        driver,
        wire,
        recorder,
        ..
    } = station.rig();
    let handle = driver.start();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let data_events: Vec<Event> = recorder
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::Data(..)))
        .collect();
    assert_eq!(data_events, vec![Event::Data("SiCard 5", 1)]);
    assert_eq!(
        &wire.written()[3..],
        &[sireader_core::protocol::commands::read_sicard_5(), ack_sequence()]
    );

    // Removal never arrives: the session falls back and the driver stays up
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!handle.is_finished());
    assert_eq!(
        &recorder.statuses()[4..],
        &[CommStatus::ProcessingError, CommStatus::Ready]
    );
    assert_eq!(handle.stop().await, DriverExit::Stopped);
}

#[tokio::test(start_paused = true)]
async fn full_sicard_5_session_returns_to_ready() {
    let station = Station::with_answers(vec![
        startup_answer(),
        config_answer(),
        sicard5_detected(),
        sicard5_data(),
        sicard_removed(),
    ])
    .await;
    let Rig {
        driver, recorder, ..
    } = station.rig();
    let handle = driver.start();
    settle().await;

    assert_eq!(
        recorder.events(),
        vec![
            Event::Status(CommStatus::Starting),
            Event::Status(CommStatus::On),
            Event::Status(CommStatus::Ready),
            Event::Status(CommStatus::Processing),
            Event::Data("SiCard 5", 1),
            Event::Status(CommStatus::Ready),
        ]
    );
    assert_eq!(handle.stop().await, DriverExit::Stopped);
}

#[tokio::test(start_paused = true)]
async fn sicard_5_timeout_recovers() {
    let station = Station::with_answers(vec![
        startup_answer(),
        config_answer(),
        sicard5_detected(),
    ])
    .await;
    let Rig {
        driver,
        wire,
        recorder,
        sender,
    } = station.rig();
    let handle = driver.start();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(
        recorder.statuses(),
        vec![
            CommStatus::Starting,
            CommStatus::On,
            CommStatus::Ready,
            CommStatus::Processing,
            CommStatus::ProcessingError,
            CommStatus::Ready,
        ]
    );
    assert!(!handle.is_finished());
    assert!(!wire.written().contains(&ack_sequence()));

    // Still serving cards after the failed session
    sender.add(sicard5_detected()).await.unwrap();
    sender.add(sicard5_data()).await.unwrap();
    sender.add(sicard_removed()).await.unwrap();
    settle().await;

    assert_eq!(
        &recorder.events()[6..],
        &[
            Event::Status(CommStatus::Processing),
            Event::Data("SiCard 5", 1),
            Event::Status(CommStatus::Ready),
        ]
    );
    assert_eq!(handle.stop().await, DriverExit::Stopped);
}

#[tokio::test(start_paused = true)]
async fn reads_sicard_8_plus() {
    let station = Station::with_answers(vec![
        startup_answer(),
        config_answer(),
        sicard8_detected(),
        sicard8_block(0),
        sicard8_block(1),
        sicard_removed(),
    ])
    .await;
    let Rig {
        driver,
        wire,
        recorder,
        ..
    } = station.rig();
    let handle = driver.start();
    settle().await;

    assert_eq!(
        &wire.written()[3..],
        &[read_sicard_8_plus_b0(), read_sicard_8_plus_b1(), ack_sequence()]
    );
    assert_eq!(
        &recorder.events()[3..],
        &[
            Event::Status(CommStatus::Processing),
            Event::Data("SiCard 8/9", 2),
            Event::Status(CommStatus::Ready),
        ]
    );
    assert_eq!(handle.stop().await, DriverExit::Stopped);
}

#[tokio::test(start_paused = true)]
async fn sicard_8_plus_failure_reports_processing_error() {
    let station = Station::with_answers(vec![
        startup_answer(),
        config_answer(),
        sicard8_detected(),
        sicard8_block(0),
        sicard_removed(),
    ])
    .await;
    let Rig {
        driver,
        wire,
        recorder,
        ..
    } = station.rig();
    let handle = driver.start();
    settle().await;

    assert_eq!(
        &recorder.events()[3..],
        &[
            Event::Status(CommStatus::Processing),
            Event::Status(CommStatus::ProcessingError),
            Event::Status(CommStatus::Ready),
        ]
    );
    assert!(!wire.written().contains(&ack_sequence()));
    assert!(!handle.is_finished());
    assert_eq!(handle.stop().await, DriverExit::Stopped);
}

#[tokio::test(start_paused = true)]
async fn unsolicited_frames_are_ignored() {
    let station = Station::with_answers(vec![
        startup_answer(),
        config_answer(),
        Message::new(TRANSMIT_RECORD, vec![0x00, 0x01]),
        Message::new(BEEP, vec![0x01]),
    ])
    .await;
    let Rig {
        driver, recorder, ..
    } = station.rig();
    let handle = driver.start();
    settle().await;

    assert_eq!(
        recorder.statuses(),
        vec![
            CommStatus::Starting,
            CommStatus::On,
            CommStatus::Ready,
            CommStatus::Processing,
            CommStatus::Ready,
            CommStatus::Processing,
            CommStatus::Ready,
        ]
    );
    assert_eq!(handle.stop().await, DriverExit::Stopped);
}

#[tokio::test(start_paused = true)]
async fn stop_while_waiting_for_startup_answer_is_clean() {
    let station = Station::with_answers(Vec::new()).await;
    let Rig {
        driver, recorder, ..
    } = station.rig();
    let handle = driver.start();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(handle.stop().await, DriverExit::Stopped);
    assert_eq!(recorder.statuses(), vec![CommStatus::Starting]);
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent_after_failure() {
    let station = Station::with_answers(Vec::new()).await;
    let Rig {
        driver, recorder, ..
    } = station.rig();
    let handle = driver.start();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(handle.is_finished());
    handle.request_stop();
    handle.request_stop();
    assert!(matches!(handle.join().await, DriverExit::Failed(_)));
    assert_eq!(
        recorder.statuses(),
        vec![CommStatus::Starting, CommStatus::FatalError, CommStatus::Off]
    );
}

#[tokio::test(start_paused = true)]
async fn write_failure_is_fatal() {
    let station = Station::with_answers(vec![startup_answer(), config_answer()]).await;
    let (queue, recorder) = (station.queue, station.recorder);
    let wire = Wire {
        fail: true,
        ..Wire::default()
    };
    let exit = SiDriver::new(queue, wire, recorder.clone()).run().await;

    assert!(matches!(exit, DriverExit::Failed(ref m) if m.contains("port closed")));
    assert_eq!(
        recorder.statuses(),
        vec![CommStatus::Starting, CommStatus::FatalError, CommStatus::Off]
    );
}

#[tokio::test(start_paused = true)]
async fn reader_failure_while_ready_is_fatal() {
    let station = Station::with_answers(vec![startup_answer(), config_answer()]).await;
    let Rig {
        driver,
        recorder,
        sender,
        ..
    } = station.rig();
    let handle = driver.start();
    settle().await;

    sender
        .fail(ProtocolError::IoError(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "device unplugged",
        )))
        .await
        .unwrap();

    let exit = handle.join().await;
    assert!(matches!(exit, DriverExit::Failed(ref m) if m.contains("device unplugged")));
    assert_eq!(
        recorder.statuses(),
        vec![
            CommStatus::Starting,
            CommStatus::On,
            CommStatus::Ready,
            CommStatus::FatalError,
            CommStatus::Off,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn closed_link_while_ready_is_fatal() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let (local, mut station) = tokio::io::duplex(256);
    let queue = MessageQueue::new(16, Duration::from_secs(1));
    let (writer, reader) = attach(local, &queue);
    station.write_all(&encode_frame(&startup_answer())).await.unwrap();
    station.write_all(&encode_frame(&config_answer())).await.unwrap();

    let recorder = Recorder::default();
    let handle = SiDriver::new(queue, writer, recorder.clone()).start();
    settle().await;
    assert_eq!(
        recorder.statuses(),
        vec![CommStatus::Starting, CommStatus::On, CommStatus::Ready]
    );

    drop(station);
    let exit = handle.join().await;
    assert!(matches!(exit, DriverExit::Failed(ref m) if m.contains("link closed")));
    assert_eq!(
        &recorder.statuses()[3..],
        &[CommStatus::FatalError, CommStatus::Off]
    );
    reader.await.unwrap();
}

/// Writer whose port never accepts the bytes
struct StalledWire;

#[async_trait::async_trait]
impl CommWriter for StalledWire {
    async fn write(&mut self, _message: &Message) -> Result<(), ProtocolError> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn stop_interrupts_stalled_write() {
    let station = Station::with_answers(Vec::new()).await;
    let recorder = Recorder::default();
    let handle = SiDriver::new(station.queue, StalledWire, recorder.clone()).start();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!handle.is_finished());

    assert_eq!(handle.stop().await, DriverExit::Stopped);
    assert_eq!(recorder.statuses(), vec![CommStatus::Starting]);
}
