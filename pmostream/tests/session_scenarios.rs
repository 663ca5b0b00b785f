//! Scénarios de bout en bout de la machine à états de session,
//! avec collaborateurs scriptés et horloge tokio en pause.

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use pmocall::testing::ScriptedSink;
use pmohls::{PlaylistFetcher, PlaylistSnapshot, SegmentRef};
use pmostream::{SessionSettings, StreamingSession};
use pmotranscode::{TargetFormat, TranscodeError, TranscodedAudio, Transcoder};

const FRAME: Duration = Duration::from_millis(20);
const FRAME_SIZE: usize = 4;
/// Chaque segment scripté produit 3 frames d'audio.
const FRAMES_PER_SEGMENT: usize = 3;

fn settings() -> SessionSettings {
    SessionSettings {
        reload_interval: Duration::from_millis(40),
        live_window: 5,
        history_capacity: 100,
        frame_duration: FRAME,
        frame_size: FRAME_SIZE,
        transcode_backoff: Duration::from_millis(10),
        target_format: TargetFormat::telephony(),
    }
}

fn segment_url(name: &str) -> Url {
    Url::parse(&format!("http://radio.test/{name}.ts")).unwrap()
}

fn snapshot(names: &[&str], finite: bool) -> PlaylistSnapshot {
    PlaylistSnapshot {
        segments: names
            .iter()
            .map(|n| SegmentRef::new(segment_url(n), None))
            .collect(),
        is_finite: finite,
    }
}

/// Audio attendu pour un segment : la lettre du segment répétée.
fn payload_of(name: &str) -> Vec<u8> {
    name.as_bytes()
        .iter()
        .copied()
        .cycle()
        .take(FRAME_SIZE * FRAMES_PER_SEGMENT)
        .collect()
}

/// Fetcher scripté : rejoue une séquence de snapshots, puis répète le
/// dernier indéfiniment.
#[derive(Clone)]
struct ScriptedFetcher {
    queue: Arc<Mutex<VecDeque<PlaylistSnapshot>>>,
    last: Arc<Mutex<Option<PlaylistSnapshot>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedFetcher {
    fn new(snapshots: Vec<PlaylistSnapshot>) -> Self {
        Self {
            queue: Arc::new(Mutex::new(snapshots.into_iter().collect())),
            last: Arc::new(Mutex::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaylistFetcher for ScriptedFetcher {
    async fn fetch(&self, _url: &Url) -> PlaylistSnapshot {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.queue.lock().unwrap().pop_front();
        match next {
            Some(snapshot) => {
                *self.last.lock().unwrap() = Some(snapshot.clone());
                snapshot
            }
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(PlaylistSnapshot::empty),
        }
    }
}

/// Transcodeur scripté : produit un payload déterministe par segment,
/// avec échecs et lenteur programmables.
#[derive(Clone, Default)]
struct ScriptedTranscoder {
    failing: Arc<Mutex<HashSet<String>>>,
    delay: Option<Duration>,
    frames_per_segment: Option<usize>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedTranscoder {
    fn new() -> Self {
        Self::default()
    }

    fn failing_on(self, name: &str) -> Self {
        self.failing
            .lock()
            .unwrap()
            .insert(segment_url(name).to_string());
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn with_frames_per_segment(mut self, frames: usize) -> Self {
        self.frames_per_segment = Some(frames);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn stem(uri: &Url) -> String {
        uri.path_segments()
            .and_then(|mut s| s.next_back())
            .unwrap_or_default()
            .trim_end_matches(".ts")
            .to_string()
    }
}

#[async_trait]
impl Transcoder for ScriptedTranscoder {
    async fn transcode(
        &self,
        source: &Url,
        _format: &TargetFormat,
        workdir: &Path,
    ) -> Result<TranscodedAudio, TranscodeError> {
        self.calls.lock().unwrap().push(source.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(source.as_str()) {
            return Err(TranscodeError::Unavailable("scripted failure".into()));
        }
        let frames = self.frames_per_segment.unwrap_or(FRAMES_PER_SEGMENT);
        let payload: Vec<u8> = Self::stem(source)
            .into_bytes()
            .into_iter()
            .cycle()
            .take(FRAME_SIZE * frames)
            .collect();
        Ok(TranscodedAudio::from_bytes(workdir, &payload)?)
    }
}

/// Transcodeur dont la sortie disparaît avant la diffusion : la session
/// doit finir en échec, nettoyée et raccrochée.
#[derive(Clone)]
struct VanishingTranscoder;

#[async_trait]
impl Transcoder for VanishingTranscoder {
    async fn transcode(
        &self,
        _source: &Url,
        _format: &TargetFormat,
        workdir: &Path,
    ) -> Result<TranscodedAudio, TranscodeError> {
        let audio = TranscodedAudio::from_bytes(workdir, b"doomed payload")?;
        std::fs::remove_file(audio.path())?;
        Ok(audio)
    }
}

fn playlist_url() -> Url {
    Url::parse("http://radio.test/index.m3u8").unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_vod_delivers_every_segment_once_in_order() {
    let fetcher = ScriptedFetcher::new(vec![snapshot(&["X", "Y"], true)]);
    let transcoder = ScriptedTranscoder::new();
    let sink = ScriptedSink::live();

    let session = StreamingSession::new(
        playlist_url(),
        fetcher.clone(),
        transcoder.clone(),
        sink.clone(),
        settings(),
    )
    .unwrap();
    let workdir = session.workdir().to_path_buf();

    let end = session.run().await;

    assert!(end.is_completed(), "unexpected end: {end:?}");
    let expected: Vec<u8> = [payload_of("X"), payload_of("Y")].concat();
    assert_eq!(sink.received_bytes(), expected);
    assert_eq!(
        transcoder.calls(),
        vec![
            segment_url("X").to_string(),
            segment_url("Y").to_string()
        ]
    );
    // Playlist épuisée alors que l'appel est encore ouvert : raccroché.
    assert!(sink.was_hung_up());
    // Le répertoire de travail est balayé avec la session.
    assert!(!workdir.exists());
}

#[tokio::test(start_paused = true)]
async fn test_transcode_failure_abandons_the_segment_and_continues() {
    let fetcher = ScriptedFetcher::new(vec![snapshot(&["X", "Y"], true)]);
    let transcoder = ScriptedTranscoder::new().failing_on("X");
    let sink = ScriptedSink::live();

    let session = StreamingSession::new(
        playlist_url(),
        fetcher,
        transcoder.clone(),
        sink.clone(),
        settings(),
    )
    .unwrap();

    let end = session.run().await;

    assert!(end.is_completed(), "unexpected end: {end:?}");
    assert_eq!(sink.received_bytes(), payload_of("Y"));
    // Le segment cassé n'a été tenté qu'une seule fois.
    let attempts = transcoder
        .calls()
        .iter()
        .filter(|u| u.ends_with("/X.ts"))
        .count();
    assert_eq!(attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_live_stream_follows_the_playlist_newest_first() {
    let fetcher = ScriptedFetcher::new(vec![
        snapshot(&["A", "B", "C", "D", "E"], false),
        snapshot(&["B", "C", "D", "E", "F"], false),
        snapshot(&["C", "D", "E", "F", "G"], false),
    ]);
    let transcoder = ScriptedTranscoder::new();
    // L'appelant raccroche après les 9 frames de E, F et G.
    let sink = ScriptedSink::dies_after_frames(3 * FRAMES_PER_SEGMENT);

    let session = StreamingSession::new(
        playlist_url(),
        fetcher.clone(),
        transcoder,
        sink.clone(),
        settings(),
    )
    .unwrap();

    let end = session.run().await;

    assert!(end.is_sink_gone(), "unexpected end: {end:?}");
    let expected: Vec<u8> =
        [payload_of("E"), payload_of("F"), payload_of("G")].concat();
    assert_eq!(sink.received_bytes(), expected);
    assert!(fetcher.calls() >= 3);
}

#[tokio::test(start_paused = true)]
async fn test_caught_up_live_stream_waits_for_fresh_segments() {
    let fetcher = ScriptedFetcher::new(vec![
        snapshot(&["A"], false),
        snapshot(&["A"], false),
        snapshot(&["A", "B"], false),
    ]);
    let transcoder = ScriptedTranscoder::new();
    let sink = ScriptedSink::dies_after_frames(2 * FRAMES_PER_SEGMENT);

    let session = StreamingSession::new(
        playlist_url(),
        fetcher.clone(),
        transcoder,
        sink.clone(),
        settings(),
    )
    .unwrap();

    let end = session.run().await;

    assert!(end.is_sink_gone(), "unexpected end: {end:?}");
    // A joué une seule fois malgré les rechargements qui le relistent,
    // puis B dès qu'il apparaît.
    let expected: Vec<u8> = [payload_of("A"), payload_of("B")].concat();
    assert_eq!(sink.received_bytes(), expected);
    assert!(fetcher.calls() >= 3);
}

#[tokio::test(start_paused = true)]
async fn test_hangup_mid_delivery_stops_within_a_frame() {
    // Un seul long segment (30 frames), raccroché après 2 frames.
    let fetcher = ScriptedFetcher::new(vec![snapshot(&["X"], true)]);
    let transcoder = ScriptedTranscoder::new().with_frames_per_segment(30);
    let sink = ScriptedSink::dies_after_frames(2);

    let session = StreamingSession::new(
        playlist_url(),
        fetcher,
        transcoder,
        sink.clone(),
        settings(),
    )
    .unwrap();
    let workdir = session.workdir().to_path_buf();

    let started = tokio::time::Instant::now();
    let end = session.run().await;

    assert!(end.is_sink_gone(), "unexpected end: {end:?}");
    assert_eq!(sink.frame_count(), 2);
    // On n'a pas attendu la fin des 30 frames.
    assert!(started.elapsed() < Duration::from_millis(200));
    // Le raccroché balaie aussi le répertoire de travail.
    assert!(!workdir.exists());
}

#[tokio::test(start_paused = true)]
async fn test_hangup_mid_transcode_does_not_wait_for_the_transcoder() {
    let fetcher = ScriptedFetcher::new(vec![snapshot(&["X"], true)]);
    let transcoder = ScriptedTranscoder::new().with_delay(Duration::from_secs(30));
    let sink = ScriptedSink::dies_after(Duration::from_millis(100));

    let session = StreamingSession::new(
        playlist_url(),
        fetcher,
        transcoder,
        sink.clone(),
        settings(),
    )
    .unwrap();

    let started = tokio::time::Instant::now();
    let end = session.run().await;

    assert!(end.is_sink_gone(), "unexpected end: {end:?}");
    assert_eq!(sink.frame_count(), 0);
    // Détection en une poll de vivacité, pas au bout des 30 s.
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_empty_fetches_are_retried_until_the_playlist_appears() {
    let fetcher = ScriptedFetcher::new(vec![
        PlaylistSnapshot::empty(),
        PlaylistSnapshot::empty(),
        snapshot(&["X"], true),
    ]);
    let transcoder = ScriptedTranscoder::new();
    let sink = ScriptedSink::live();

    let session = StreamingSession::new(
        playlist_url(),
        fetcher.clone(),
        transcoder,
        sink.clone(),
        settings(),
    )
    .unwrap();

    let started = tokio::time::Instant::now();
    let end = session.run().await;

    assert!(end.is_completed(), "unexpected end: {end:?}");
    assert!(fetcher.calls() >= 3);
    assert_eq!(sink.received_bytes(), payload_of("X"));
    // Deux backoffs d'un intervalle complet avant le premier succès.
    assert!(started.elapsed() >= 2 * settings().reload_interval);
}

#[tokio::test(start_paused = true)]
async fn test_unreadable_audio_fails_the_session_but_cleans_up() {
    let fetcher = ScriptedFetcher::new(vec![snapshot(&["X"], true)]);
    let sink = ScriptedSink::live();

    let session = StreamingSession::new(
        playlist_url(),
        fetcher,
        VanishingTranscoder,
        sink.clone(),
        settings(),
    )
    .unwrap();
    let workdir = session.workdir().to_path_buf();

    let end = session.run().await;

    assert!(end.is_failed(), "unexpected end: {end:?}");
    // Même en échec : raccroché actif et répertoire balayé.
    assert!(sink.was_hung_up());
    assert!(!workdir.exists());
}

#[tokio::test(start_paused = true)]
async fn test_dead_sink_ends_the_session_before_any_fetch() {
    let fetcher = ScriptedFetcher::new(vec![snapshot(&["X"], true)]);
    let transcoder = ScriptedTranscoder::new();
    let sink = ScriptedSink::live();
    sink.kill();

    let session = StreamingSession::new(
        playlist_url(),
        fetcher.clone(),
        transcoder,
        sink.clone(),
        settings(),
    )
    .unwrap();

    let end = session.run().await;

    assert!(end.is_sink_gone(), "unexpected end: {end:?}");
    assert_eq!(fetcher.calls(), 0);
    assert_eq!(sink.frame_count(), 0);
}
