//! Thread-safe fake collaborators whose state the test can inspect while the
//! runtime owns them.

use std::sync::{Arc, Mutex};

use party_client::ClientInputs;
use party_core::{
    ClientId, IceCandidate, IceConfig, MediaCapture, MediaEngine, PartyError, PartyResult, PeerConnection,
    Player, PlayerEvent, SdpKind, SessionDescription, StreamHandle,
};

/// One call observed on a fake peer connection.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Create { peer: ClientId, stream: Option<String> },
    Local { peer: ClientId, kind: SdpKind },
    Remote { peer: ClientId, kind: SdpKind },
    Candidate { peer: ClientId, candidate: String },
    Bitrate { peer: ClientId, bps: u32 },
    Close { peer: ClientId },
}

type CallLog = Arc<Mutex<Vec<EngineCall>>>;

fn record(log: &CallLog, call: EngineCall) {
    log.lock().expect("call log").push(call);
}

pub struct FakeConnection {
    peer: ClientId,
    log: CallLog,
    has_remote: bool,
}

impl PeerConnection for FakeConnection {
    fn create_offer(&mut self) -> PartyResult<SessionDescription> {
        Ok(SessionDescription::offer(format!("v=0\r\ns=offer-to-{}\r\n", self.peer)))
    }

    fn create_answer(&mut self) -> PartyResult<SessionDescription> {
        if !self.has_remote {
            return Err(PartyError::Media("no remote offer".into()));
        }
        Ok(SessionDescription::answer(format!("v=0\r\ns=answer-to-{}\r\n", self.peer)))
    }

    fn set_local_description(&mut self, description: &SessionDescription) -> PartyResult<()> {
        record(
            &self.log,
            EngineCall::Local {
                peer: self.peer.clone(),
                kind: description.kind,
            },
        );
        Ok(())
    }

    fn set_remote_description(&mut self, description: &SessionDescription) -> PartyResult<()> {
        self.has_remote = true;
        record(
            &self.log,
            EngineCall::Remote {
                peer: self.peer.clone(),
                kind: description.kind,
            },
        );
        Ok(())
    }

    fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> PartyResult<()> {
        record(
            &self.log,
            EngineCall::Candidate {
                peer: self.peer.clone(),
                candidate: candidate.candidate.clone(),
            },
        );
        Ok(())
    }

    fn set_max_video_bitrate(&mut self, bps: u32) -> PartyResult<()> {
        record(
            &self.log,
            EngineCall::Bitrate {
                peer: self.peer.clone(),
                bps,
            },
        );
        Ok(())
    }

    fn close(&mut self) {
        record(
            &self.log,
            EngineCall::Close {
                peer: self.peer.clone(),
            },
        );
    }
}

#[derive(Default)]
pub struct FakeEngine {
    pub log: CallLog,
    pub ice: Arc<Mutex<Vec<IceConfig>>>,
}

impl MediaEngine for FakeEngine {
    type Connection = FakeConnection;

    fn create_connection(
        &mut self,
        peer: &ClientId,
        ice: &IceConfig,
        local_stream: Option<&StreamHandle>,
    ) -> PartyResult<FakeConnection> {
        self.ice.lock().expect("ice log").push(ice.clone());
        record(
            &self.log,
            EngineCall::Create {
                peer: peer.clone(),
                stream: local_stream.map(|s| s.id().to_string()),
            },
        );
        Ok(FakeConnection {
            peer: peer.clone(),
            log: Arc::clone(&self.log),
            has_remote: false,
        })
    }
}

#[derive(Default)]
pub struct FakeCapture {
    pub deny: bool,
    pub released: Arc<Mutex<Vec<String>>>,
    pub next: u32,
}

impl MediaCapture for FakeCapture {
    fn acquire(&mut self) -> PartyResult<StreamHandle> {
        if self.deny {
            return Err(PartyError::MediaAcquisitionDenied("permission denied".into()));
        }
        self.next += 1;
        Ok(StreamHandle::new(format!("screen-{}", self.next)))
    }

    fn release(&mut self, stream: &StreamHandle) {
        self.released
            .lock()
            .expect("released log")
            .push(stream.id().to_string());
    }
}

/// Observable player state.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub time: f64,
    pub paused: bool,
    pub url: Option<String>,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            time: 0.0,
            paused: true,
            url: None,
        }
    }
}

/// Player that reports its changes back through the runtime inputs, the
/// way a real media element fires events after being driven.
pub struct SharedPlayer {
    pub state: Arc<Mutex<PlayerState>>,
    inputs: ClientInputs,
}

impl SharedPlayer {
    pub fn new(inputs: ClientInputs) -> Self {
        Self {
            state: Arc::new(Mutex::new(PlayerState::default())),
            inputs,
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut PlayerState) -> T) -> T {
        f(&mut self.state.lock().expect("player state"))
    }
}

impl Player for SharedPlayer {
    fn current_time(&self) -> f64 {
        self.with_state(|s| s.time)
    }

    fn is_paused(&self) -> bool {
        self.with_state(|s| s.paused)
    }

    fn source(&self) -> Option<String> {
        self.with_state(|s| s.url.clone())
    }

    fn load(&mut self, url: &str) {
        self.with_state(|s| {
            s.url = Some(url.to_string());
            s.time = 0.0;
            s.paused = true;
        });
        self.inputs
            .player_event(PlayerEvent::SourceChanged(url.to_string()));
    }

    fn play(&mut self) {
        if self.with_state(|s| std::mem::replace(&mut s.paused, false)) {
            self.inputs.player_event(PlayerEvent::Played);
        }
    }

    fn pause(&mut self) {
        if !self.with_state(|s| std::mem::replace(&mut s.paused, true)) {
            self.inputs.player_event(PlayerEvent::Paused);
        }
    }

    fn seek(&mut self, time: f64) {
        self.with_state(|s| s.time = time);
        self.inputs.player_event(PlayerEvent::Seeked(time));
    }
}
