// Test doubles shared by the integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use aletheia::backend::{AnalysisBackend, ImageUpload, Verdict};
use aletheia::card::Markup;
use aletheia::relay::{ChatClient, InboundMessage, MediaRef, Payload};

pub fn verdict(is_news: bool, is_misinformation: bool, confidence: f64) -> Verdict {
    Verdict {
        is_misinformation,
        confidence,
        is_news,
        summary: "Claim matches a debunked story.".into(),
        evidence: vec!["No official statement exists".into()],
        sources_checked: vec!["reuters.com".into()],
        recommendation: "Do not forward.".into(),
        message_type: "text".into(),
        extracted_text: None,
        image_description: None,
    }
}

/// Backend double answering every call with a fixed verdict (or failing)
pub struct FakeBackend {
    pub verdict: Option<Verdict>,
    pub text_calls: AtomicUsize,
    pub image_calls: AtomicUsize,
    pub last_text: Mutex<Option<String>>,
    pub last_image: Mutex<Option<ImageUpload>>,
}

impl FakeBackend {
    pub fn answering(verdict: Verdict) -> Self {
        Self::new(Some(verdict))
    }

    pub fn failing() -> Self {
        Self::new(None)
    }

    fn new(verdict: Option<Verdict>) -> Self {
        Self {
            verdict,
            text_calls: AtomicUsize::new(0),
            image_calls: AtomicUsize::new(0),
            last_text: Mutex::new(None),
            last_image: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst) + self.image_calls.load(Ordering::SeqCst)
    }

    fn answer(&self) -> anyhow::Result<Verdict> {
        self.verdict
            .clone()
            .ok_or_else(|| anyhow::anyhow!("backend returned status 500 Internal Server Error"))
    }
}

#[async_trait::async_trait]
impl AnalysisBackend for FakeBackend {
    async fn analyze_text(&self, text: &str) -> anyhow::Result<Verdict> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_text.lock().unwrap() = Some(text.to_string());
        self.answer()
    }

    async fn analyze_image(&self, image: ImageUpload) -> anyhow::Result<Verdict> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_image.lock().unwrap() = Some(image);
        self.answer()
    }
}

/// Chat double recording replies and acknowledgements
#[derive(Default)]
pub struct RecordingChat {
    pub replies: Mutex<Vec<(String, String)>>,
    pub acks: AtomicUsize,
    pub media: Option<Vec<u8>>,
    pub markup: Markup,
}

impl RecordingChat {
    pub fn with_media(data: Vec<u8>) -> Self {
        Self {
            media: Some(data),
            ..Default::default()
        }
    }

    pub fn with_markup(markup: Markup) -> Self {
        Self {
            markup,
            ..Default::default()
        }
    }

    /// `(quoted message id, text)` pairs in send order
    pub fn replies(&self) -> Vec<(String, String)> {
        self.replies.lock().unwrap().clone()
    }

    /// Poll until at least `count` replies were sent or the deadline passes
    pub async fn wait_for_replies(&self, count: usize) -> Vec<(String, String)> {
        for _ in 0..100 {
            let replies = self.replies();
            if replies.len() >= count {
                return replies;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.replies()
    }
}

#[async_trait::async_trait]
impl ChatClient for RecordingChat {
    fn channel(&self) -> &'static str {
        "test"
    }

    fn markup(&self) -> Markup {
        self.markup
    }

    async fn download_media(&self, _media: &MediaRef) -> anyhow::Result<Vec<u8>> {
        self.media
            .clone()
            .ok_or_else(|| anyhow::anyhow!("media expired"))
    }

    async fn send_reply(&self, original: &InboundMessage, text: &str) -> anyhow::Result<()> {
        self.replies
            .lock()
            .unwrap()
            .push((original.id.clone(), text.to_string()));
        Ok(())
    }

    async fn acknowledge(&self, _original: &InboundMessage) -> anyhow::Result<()> {
        self.acks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn text_message(id: &str, text: &str) -> InboundMessage {
    InboundMessage {
        id: id.to_string(),
        chat_id: "16505551234".into(),
        sender: "16505551234".into(),
        from_me: false,
        payload: Payload::Text(text.to_string()),
    }
}

pub fn image_message(id: &str) -> InboundMessage {
    InboundMessage {
        id: id.to_string(),
        chat_id: "16505551234".into(),
        sender: "16505551234".into(),
        from_me: false,
        payload: Payload::Image(MediaRef {
            id: "media-1".into(),
            mime_type: Some("image/png".into()),
        }),
    }
}
