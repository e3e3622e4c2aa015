//! Scripted test doubles for the stage traits.
//!
//! Each double answers from a queue of [`Behaviour`]s and falls back to a
//! fixed behaviour once the queue is empty. Calls are counted so tests can
//! assert that a stage was never reached.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::audio::AudioClip;

use super::{
    Animator, AudioRef, Generation, Generator, MediaRef, Recognition, Recognizer, ServiceError,
    ServiceSet, SynthesisRequest, Synthesizer,
};

#[derive(Clone)]
pub(crate) enum Behaviour<T> {
    Reply(Result<T, ServiceError>),
    After(Duration, Result<T, ServiceError>),
    Hang,
}

pub(crate) struct Scripted<T> {
    script: Mutex<VecDeque<Behaviour<T>>>,
    fallback: Behaviour<T>,
    calls: AtomicUsize,
}

impl<T: Clone + Send> Scripted<T> {
    fn new(fallback: Behaviour<T>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    fn push(&self, behaviour: Behaviour<T>) {
        self.script.lock().unwrap().push_back(behaviour);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn call(&self) -> Result<T, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behaviour = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match behaviour {
            Behaviour::Reply(result) => result,
            Behaviour::After(delay, result) => {
                tokio::time::sleep(delay).await;
                result
            }
            Behaviour::Hang => std::future::pending().await,
        }
    }
}

// ---------------------------------------------------------------------------
// Doubles
// ---------------------------------------------------------------------------

pub(crate) struct MockRecognizer(pub Scripted<Recognition>);
pub(crate) struct MockSynthesizer {
    pub inner: Scripted<AudioRef>,
    pub requests: Mutex<Vec<SynthesisRequest>>,
}
pub(crate) struct MockAnimator(pub Scripted<MediaRef>);

/// Also records `(message, context)` of every call.
pub(crate) struct MockGenerator {
    pub inner: Scripted<Generation>,
    pub inputs: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Recognizer for MockRecognizer {
    async fn recognize(&self, _clip: &AudioClip) -> Result<Recognition, ServiceError> {
        self.0.call().await
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, message: &str, context: &str) -> Result<Generation, ServiceError> {
        self.inputs
            .lock()
            .unwrap()
            .push((message.to_string(), context.to_string()));
        self.inner.call().await
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioRef, ServiceError> {
        self.requests.lock().unwrap().push(request.clone());
        self.inner.call().await
    }
}

#[async_trait]
impl Animator for MockAnimator {
    async fn animate(&self, _audio: &AudioRef) -> Result<MediaRef, ServiceError> {
        self.0.call().await
    }
}

// ---------------------------------------------------------------------------
// MockServices
// ---------------------------------------------------------------------------

pub(crate) fn audio_ref(id: &str) -> AudioRef {
    AudioRef {
        id: id.to_string(),
        url: format!("http://tts/audio/{id}"),
        data: b"RIFF".to_vec(),
    }
}

/// A full set of doubles that succeed by default:
/// recognition `"Hello"`, generation `"Hi there"`, audio `a1`, video `v1`.
pub(crate) struct MockServices {
    pub recognizer: Arc<MockRecognizer>,
    pub generator: Arc<MockGenerator>,
    pub synthesizer: Arc<MockSynthesizer>,
    pub animator: Arc<MockAnimator>,
}

impl MockServices {
    pub fn new() -> Self {
        Self {
            recognizer: Arc::new(MockRecognizer(Scripted::new(Behaviour::Reply(Ok(
                Recognition {
                    text: "Hello".into(),
                    confidence: Some(0.9),
                },
            ))))),
            generator: Arc::new(MockGenerator {
                inner: Scripted::new(Behaviour::Reply(Ok(Generation {
                    text: "Hi there".into(),
                    emotion: None,
                }))),
                inputs: Mutex::new(Vec::new()),
            }),
            synthesizer: Arc::new(MockSynthesizer {
                inner: Scripted::new(Behaviour::Reply(Ok(audio_ref("a1")))),
                requests: Mutex::new(Vec::new()),
            }),
            animator: Arc::new(MockAnimator(Scripted::new(Behaviour::Reply(Ok(
                MediaRef::new("v1"),
            ))))),
        }
    }

    pub fn recognition(self, behaviour: Behaviour<Recognition>) -> Self {
        self.recognizer.0.push(behaviour);
        self
    }

    pub fn generation(self, behaviour: Behaviour<Generation>) -> Self {
        self.generator.inner.push(behaviour);
        self
    }

    pub fn synthesis(self, behaviour: Behaviour<AudioRef>) -> Self {
        self.synthesizer.inner.push(behaviour);
        self
    }

    pub fn animation(self, behaviour: Behaviour<MediaRef>) -> Self {
        self.animator.0.push(behaviour);
        self
    }

    /// Calls per stage: `[recognize, generate, synthesize, animate]`.
    pub fn calls(&self) -> [usize; 4] {
        [
            self.recognizer.0.calls(),
            self.generator.inner.calls(),
            self.synthesizer.inner.calls(),
            self.animator.0.calls(),
        ]
    }

    pub fn set(&self) -> ServiceSet {
        ServiceSet {
            recognizer: self.recognizer.clone(),
            generator: self.generator.clone(),
            synthesizer: self.synthesizer.clone(),
            animator: self.animator.clone(),
        }
    }
}
