//! End-to-end pipeline tests: raw events in, spoken utterances out, with
//! mock collaborators standing in for every external service.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use chatvox::chat::{MessageId, ProcessedUtterance, SourceKind, VoiceLanguage, VoiceProfile};
use chatvox::filter::scoring::{ScoringError, ToxicityScorer};
use chatvox::filter::stopwords::StopWordRule;
use chatvox::filter::translate::{TranslationError, Translator};
use chatvox::filter::FilterConfig;
use chatvox::normalize::NormalizerConfig;
use chatvox::orchestrator::{Collaborators, Orchestrator, SourceSpec};
use chatvox::pipeline::VoiceSettings;
use chatvox::playback::output::{AudioOutput, PlaybackError};
use chatvox::playback::synth::{AudioClip, SpeechSynthesizer, SynthesisError};
use chatvox::playback::PlaybackOptions;
use chatvox::queue::SpeechQueue;
use chatvox::sources::youtube::{LiveChatApi, PollBatch, PollError};
use chatvox::sources::RawChatEvent;

/// Synthesizer that encodes the text into the clip so the output mock can
/// record what was "spoken".
struct EchoSynth;

#[async_trait]
impl SpeechSynthesizer for EchoSynth {
    async fn synthesize(
        &self,
        text: &str,
        _voice: &VoiceProfile,
    ) -> Result<AudioClip, SynthesisError> {
        Ok(AudioClip {
            wav_bytes: text.as_bytes().to_vec(),
        })
    }
}

/// Records every played clip (decoded back to text) with start/end instants.
#[derive(Default)]
struct RecordingOutput {
    plays: Mutex<Vec<(String, std::time::Instant, std::time::Instant)>>,
    play_duration: Option<Duration>,
}

impl RecordingOutput {
    fn with_duration(duration: Duration) -> Self {
        Self {
            plays: Mutex::new(Vec::new()),
            play_duration: Some(duration),
        }
    }

    fn spoken_texts(&self) -> Vec<String> {
        self.plays.lock().iter().map(|(t, _, _)| t.clone()).collect()
    }
}

#[async_trait]
impl AudioOutput for RecordingOutput {
    async fn play(&self, clip: AudioClip, _volume: f32, _speed: f32) -> Result<(), PlaybackError> {
        let start = std::time::Instant::now();
        if let Some(duration) = self.play_duration {
            tokio::time::sleep(duration).await;
        }
        let end = std::time::Instant::now();
        self.plays.lock().push((
            String::from_utf8_lossy(&clip.wav_bytes).to_string(),
            start,
            end,
        ));
        Ok(())
    }

    fn stop(&self) {}
}

/// Serves one scripted batch, then parks forever (the worker keeps waiting
/// on the "network" until it is stopped).
struct OneBatchApi {
    events: Mutex<Option<Vec<RawChatEvent>>>,
}

impl OneBatchApi {
    fn new(events: Vec<RawChatEvent>) -> Self {
        Self {
            events: Mutex::new(Some(events)),
        }
    }
}

#[async_trait]
impl LiveChatApi for OneBatchApi {
    async fn fetch(&self, _page_token: Option<&str>) -> Result<PollBatch, PollError> {
        let events = self.events.lock().take();
        match events {
            Some(messages) => Ok(PollBatch {
                messages,
                next_token: Some("tok-1".to_string()),
                min_interval: Duration::from_millis(10),
            }),
            None => std::future::pending().await,
        }
    }
}

fn event(id: &str, author: &str, text: &str) -> RawChatEvent {
    RawChatEvent {
        id: Some(id.to_string()),
        author: Some(author.to_string()),
        text: Some(text.to_string()),
        is_member: false,
        source: SourceKind::YouTube,
    }
}

fn no_delay() -> PlaybackOptions {
    PlaybackOptions {
        inter_utterance_delay: Duration::from_millis(0),
    }
}

fn orchestrator_with(
    output: Arc<RecordingOutput>,
    filters: FilterConfig,
    scorer: Option<Arc<dyn ToxicityScorer>>,
    translator: Option<Arc<dyn Translator>>,
    capacity: usize,
) -> Orchestrator {
    Orchestrator::new(
        Collaborators {
            synthesizer: Arc::new(EchoSynth),
            audio_output: output,
            toxicity_scorer: scorer,
            translator,
        },
        filters,
        NormalizerConfig::default(),
        VoiceSettings::default(),
        capacity,
        no_delay(),
    )
}

async fn wait_for<F: Fn() -> bool>(condition: F, what: &str) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}

fn utterance(text: &str) -> ProcessedUtterance {
    ProcessedUtterance::new(
        MessageId(format!("id-{text}")),
        text.to_string(),
        VoiceProfile::default(),
        1.0,
        1.0,
    )
    .unwrap()
}

// --- queue contract -------------------------------------------------------

#[tokio::test]
async fn capacity_two_accepts_a_b_rejects_c_then_dequeues_in_order() {
    let queue = SpeechQueue::new(2);

    assert!(queue.enqueue(utterance("A")));
    assert!(queue.enqueue(utterance("B")));
    assert!(!queue.enqueue(utterance("C")));

    assert_eq!(queue.dropped_count(), 1);
    assert_eq!(queue.dequeue().await.unwrap().spoken_text, "A");
    assert_eq!(queue.dequeue().await.unwrap().spoken_text, "B");
    assert!(queue.is_empty());
}

#[tokio::test]
async fn queue_length_never_exceeds_capacity_under_concurrent_producers() {
    let queue = Arc::new(SpeechQueue::new(4));
    let attempts = 300u64;
    let mut producers = Vec::new();
    for p in 0..3 {
        let queue = queue.clone();
        producers.push(tokio::spawn(async move {
            for i in 0..(attempts / 3) {
                queue.enqueue(utterance(&format!("p{p}-{i}")));
                assert!(queue.len() <= 4);
                tokio::task::yield_now().await;
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }
    assert_eq!(queue.len() as u64 + queue.dropped_count(), attempts);
}

// --- filtering end to end -------------------------------------------------

#[tokio::test]
async fn stop_word_message_is_never_spoken() {
    let output = Arc::new(RecordingOutput::default());
    let orchestrator = orchestrator_with(
        output.clone(),
        FilterConfig {
            stop_words: vec![StopWordRule::Substring("casino".to_string())],
            expand_numbers: false,
            ..Default::default()
        },
        None,
        None,
        10,
    );

    let api = Arc::new(OneBatchApi::new(vec![
        event("1", "alice", "visit my casino now"),
        event("2", "bob", "good evening everyone"),
    ]));
    orchestrator
        .add_source(SourceSpec::YouTubeApi(api))
        .await
        .unwrap();

    wait_for(
        || !output.spoken_texts().is_empty(),
        "the clean message to be spoken",
    )
    .await;
    // give the rejected one a chance to sneak through if the filter is broken
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(output.spoken_texts(), vec!["good evening everyone"]);
    orchestrator.shutdown().await.unwrap();
}

struct ThresholdScorer;

#[async_trait]
impl ToxicityScorer for ThresholdScorer {
    async fn score(&self, text: &str) -> Result<f32, ScoringError> {
        // scripted scores by marker word
        if text.contains("nasty") {
            Ok(0.95)
        } else {
            Ok(0.05)
        }
    }
}

#[tokio::test]
async fn toxic_message_rejected_clean_message_spoken() {
    let output = Arc::new(RecordingOutput::default());
    let orchestrator = orchestrator_with(
        output.clone(),
        FilterConfig {
            toxicity_threshold: Some(0.8),
            expand_numbers: false,
            ..Default::default()
        },
        Some(Arc::new(ThresholdScorer)),
        None,
        10,
    );

    let api = Arc::new(OneBatchApi::new(vec![
        event("1", "troll", "something nasty here"),
        event("2", "alice", "lovely stream today"),
    ]));
    orchestrator
        .add_source(SourceSpec::YouTubeApi(api))
        .await
        .unwrap();

    wait_for(
        || !output.spoken_texts().is_empty(),
        "the clean message to be spoken",
    )
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(output.spoken_texts(), vec!["lovely stream today"]);
    assert_eq!(
        chatvox::stats::PipelineStats::get(&orchestrator.stats().toxic),
        1
    );
    orchestrator.shutdown().await.unwrap();
}

struct BrokenTranslator;

#[async_trait]
impl Translator for BrokenTranslator {
    async fn translate(&self, _text: &str, _target: &str) -> Result<String, TranslationError> {
        Err(TranslationError::ServiceUnavailable("always down".into()))
    }
}

#[tokio::test]
async fn translation_failure_speaks_original_text() {
    let output = Arc::new(RecordingOutput::default());
    let orchestrator = orchestrator_with(
        output.clone(),
        FilterConfig {
            target_language: Some("en".to_string()),
            expand_numbers: false,
            ..Default::default()
        },
        None,
        Some(Arc::new(BrokenTranslator)),
        10,
    );

    let api = Arc::new(OneBatchApi::new(vec![event(
        "1",
        "pierre",
        "bonjour tout le monde",
    )]));
    orchestrator
        .add_source(SourceSpec::YouTubeApi(api))
        .await
        .unwrap();

    wait_for(|| !output.spoken_texts().is_empty(), "message to be spoken").await;
    assert_eq!(output.spoken_texts(), vec!["bonjour tout le monde"]);
    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn number_expansion_speaks_word_form() {
    let output = Arc::new(RecordingOutput::default());
    let orchestrator = orchestrator_with(
        output.clone(),
        FilterConfig {
            expand_numbers: true,
            ..Default::default()
        },
        None,
        None,
        10,
    );

    let api = Arc::new(OneBatchApi::new(vec![event(
        "1",
        "alice",
        "see you in 5 minutes",
    )]));
    orchestrator
        .add_source(SourceSpec::YouTubeApi(api))
        .await
        .unwrap();

    wait_for(|| !output.spoken_texts().is_empty(), "message to be spoken").await;
    let spoken = output.spoken_texts().remove(0);
    assert!(spoken.contains("five"), "got: {spoken}");
    assert!(!spoken.contains('5'), "got: {spoken}");
    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn duplicate_events_across_poll_retries_are_spoken_once() {
    let output = Arc::new(RecordingOutput::default());
    let orchestrator = orchestrator_with(
        output.clone(),
        FilterConfig {
            expand_numbers: false,
            ..Default::default()
        },
        None,
        None,
        10,
    );

    // the same message delivered twice, as happens across a retry boundary
    let api = Arc::new(OneBatchApi::new(vec![
        event("1", "alice", "did you see that"),
        event("1", "alice", "did you see that"),
    ]));
    orchestrator
        .add_source(SourceSpec::YouTubeApi(api))
        .await
        .unwrap();

    wait_for(|| !output.spoken_texts().is_empty(), "message to be spoken").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(output.spoken_texts().len(), 1);
    orchestrator.shutdown().await.unwrap();
}

// --- playback serialization ----------------------------------------------

#[tokio::test]
async fn consecutive_plays_never_overlap() {
    let output = Arc::new(RecordingOutput::with_duration(Duration::from_millis(30)));
    let orchestrator = orchestrator_with(
        output.clone(),
        FilterConfig {
            expand_numbers: false,
            ..Default::default()
        },
        None,
        None,
        10,
    );

    let api = Arc::new(OneBatchApi::new(vec![
        event("1", "a", "first message"),
        event("2", "b", "second message"),
        event("3", "c", "third message"),
    ]));
    orchestrator
        .add_source(SourceSpec::YouTubeApi(api))
        .await
        .unwrap();

    wait_for(|| output.plays.lock().len() == 3, "all three plays").await;
    orchestrator.shutdown().await.unwrap();

    let plays = output.plays.lock();
    for pair in plays.windows(2) {
        let (_, _, first_end) = &pair[0];
        let (_, second_start, _) = &pair[1];
        assert!(
            second_start >= first_end,
            "playback intervals overlap: {:?} vs {:?}",
            first_end,
            second_start
        );
    }
}

#[tokio::test]
async fn single_source_fifo_order_is_preserved_end_to_end() {
    let output = Arc::new(RecordingOutput::default());
    let orchestrator = orchestrator_with(
        output.clone(),
        FilterConfig {
            expand_numbers: false,
            ..Default::default()
        },
        None,
        None,
        50,
    );

    let events: Vec<RawChatEvent> = (0..10)
        .map(|i| event(&format!("{i}"), &format!("author{i}"), &format!("message number {i}")))
        .collect();
    let api = Arc::new(OneBatchApi::new(events));
    orchestrator
        .add_source(SourceSpec::YouTubeApi(api))
        .await
        .unwrap();

    wait_for(|| output.spoken_texts().len() == 10, "all messages spoken").await;
    orchestrator.shutdown().await.unwrap();

    let expected: Vec<String> = (0..10).map(|i| format!("message number {i}")).collect();
    assert_eq!(output.spoken_texts(), expected);
}

/// Output whose "long" clips play until cancelled.
#[derive(Default)]
struct CancellableOutput {
    notify: tokio::sync::Notify,
    played: Mutex<Vec<String>>,
    cancelled: Mutex<Vec<String>>,
}

#[async_trait]
impl AudioOutput for CancellableOutput {
    async fn play(&self, clip: AudioClip, _volume: f32, _speed: f32) -> Result<(), PlaybackError> {
        let text = String::from_utf8_lossy(&clip.wav_bytes).to_string();
        let duration = if text.contains("long") {
            Duration::from_secs(30)
        } else {
            Duration::from_millis(1)
        };
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.played.lock().push(text),
            _ = self.notify.notified() => self.cancelled.lock().push(text),
        }
        Ok(())
    }

    fn stop(&self) {
        // notify_one stores a permit, so a stop racing ahead of the play
        // future still cancels it
        self.notify.notify_one();
    }
}

#[tokio::test]
async fn cancel_aborts_current_utterance_only() {
    let output = Arc::new(CancellableOutput::default());
    let orchestrator = Orchestrator::new(
        Collaborators {
            synthesizer: Arc::new(EchoSynth),
            audio_output: output.clone(),
            toxicity_scorer: None,
            translator: None,
        },
        FilterConfig::default(),
        NormalizerConfig::default(),
        VoiceSettings::default(),
        10,
        no_delay(),
    );

    assert!(orchestrator.enqueue_direct(utterance("a long speech")));
    assert!(orchestrator.enqueue_direct(utterance("a quick word")));

    wait_for(
        || orchestrator.playback_state() == chatvox::PlaybackState::Playing,
        "long utterance to start playing",
    )
    .await;

    orchestrator.cancel_current_utterance();

    wait_for(
        || !output.played.lock().is_empty(),
        "next utterance to play after cancel",
    )
    .await;

    assert_eq!(output.cancelled.lock().as_slice(), ["a long speech"]);
    assert_eq!(output.played.lock().as_slice(), ["a quick word"]);
    orchestrator.shutdown().await.unwrap();
}

// --- voice settings -------------------------------------------------------

#[tokio::test]
async fn author_prefix_applied_when_configured() {
    let output = Arc::new(RecordingOutput::default());
    let orchestrator = Orchestrator::new(
        Collaborators {
            synthesizer: Arc::new(EchoSynth),
            audio_output: output.clone(),
            toxicity_scorer: None,
            translator: None,
        },
        FilterConfig {
            expand_numbers: false,
            ..Default::default()
        },
        NormalizerConfig::default(),
        VoiceSettings {
            profile: VoiceProfile::new(VoiceLanguage::En, "en_1"),
            volume: 1.0,
            speed: 1.0,
            read_author_names: true,
        },
        10,
        no_delay(),
    );

    let api = Arc::new(OneBatchApi::new(vec![event("1", "alice", "hello chat")]));
    orchestrator
        .add_source(SourceSpec::YouTubeApi(api))
        .await
        .unwrap();

    wait_for(|| !output.spoken_texts().is_empty(), "message to be spoken").await;
    assert_eq!(output.spoken_texts(), vec!["alice said: hello chat"]);
    orchestrator.shutdown().await.unwrap();
}
