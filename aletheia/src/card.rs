// Human-readable verdict cards sent back to chat users

use teloxide::utils::html;

use crate::backend::Verdict;

const FOOTER: &str = "Always verify important news from multiple credible sources.";

/// At most this many evidence and source bullets are shown
pub const MAX_BULLETS: usize = 3;

const BAR_WIDTH: usize = 10;

/// Confidence above which a misinformation verdict is called "likely"
const LIKELY_THRESHOLD: f64 = 0.7;

/// Inline formatting understood by the chat network a reply goes to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Markup {
    /// `*bold*` and `_italic_`, text sent as is
    #[default]
    WhatsApp,
    /// Telegram HTML parse mode; text is entity-escaped
    Html,
}

impl Markup {
    pub fn text(self, s: &str) -> String {
        match self {
            Markup::WhatsApp => s.to_string(),
            Markup::Html => html::escape(s),
        }
    }

    fn bold(self, s: &str) -> String {
        match self {
            Markup::WhatsApp => format!("*{}*", s),
            Markup::Html => format!("<b>{}</b>", html::escape(s)),
        }
    }

    fn italic(self, s: &str) -> String {
        match self {
            Markup::WhatsApp => format!("_{}_", s),
            Markup::Html => format!("<i>{}</i>", html::escape(s)),
        }
    }
}

/// Failures the user is told about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Backend unreachable or erroring on a text message
    Backend,
    /// The chat network would not hand over the image
    ImageDownload,
    /// Backend unreachable or erroring on an image
    ImageAnalysis,
}

impl Failure {
    fn detail(self) -> &'static str {
        match self {
            Failure::Backend => "Could not connect to the analysis backend. Please try again later.",
            Failure::ImageDownload => "Could not download the image. Please try again.",
            Failure::ImageAnalysis => "Could not analyze the image. Please try again later.",
        }
    }

    pub fn render(self, markup: Markup) -> String {
        format!("❌ {}\n\n{}", markup.bold("Error"), markup.text(self.detail()))
    }
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// Number of filled blocks for a confidence value: `floor(confidence * 10)`, clamped to the bar.
pub fn filled_blocks(confidence: f64) -> usize {
    (clamp_confidence(confidence) * BAR_WIDTH as f64).floor() as usize
}

/// Ten-block bar, e.g. `████████░░` for 0.85
pub fn confidence_bar(confidence: f64) -> String {
    let filled = filled_blocks(confidence);
    let mut bar = "█".repeat(filled);
    bar.push_str(&"░".repeat(BAR_WIDTH - filled));
    bar
}

fn status_line(verdict: &Verdict) -> (&'static str, &'static str) {
    if !verdict.is_misinformation {
        ("✅", "APPEARS CREDIBLE")
    } else if verdict.confidence > LIKELY_THRESHOLD {
        ("🚨", "LIKELY MISINFORMATION")
    } else {
        ("⚠️", "POTENTIALLY MISLEADING")
    }
}

fn push_section(out: &mut String, markup: Markup, title: &str, body: &str) {
    if body.is_empty() {
        return;
    }
    out.push_str(&format!("\n{}\n{}\n", markup.bold(title), markup.text(body)));
}

fn push_bullets(out: &mut String, markup: Markup, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("\n{}\n", markup.bold(title)));
    for item in items.iter().take(MAX_BULLETS) {
        out.push_str(&format!("• {}\n", markup.text(item)));
    }
}

/// Render a verdict as the reply card
pub fn format_verdict(verdict: &Verdict, markup: Markup) -> String {
    let (emoji, status) = status_line(verdict);
    let gauge = format!(
        "[{}] {:.0}%",
        confidence_bar(verdict.confidence),
        clamp_confidence(verdict.confidence) * 100.0
    );
    let mut out = format!(
        "{} {}\n\n{} {}\n",
        emoji,
        markup.bold(status),
        markup.bold("Confidence:"),
        markup.text(&gauge)
    );

    push_section(&mut out, markup, "Summary:", &verdict.summary);
    push_bullets(&mut out, markup, "Evidence:", &verdict.evidence);
    push_bullets(&mut out, markup, "Sources:", &verdict.sources_checked);
    push_section(&mut out, markup, "Recommendation:", &verdict.recommendation);

    out.push('\n');
    out.push_str(&markup.italic(FOOTER));
    out
}
