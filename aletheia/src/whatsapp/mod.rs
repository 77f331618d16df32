//! WhatsApp Business Cloud API channel.
//!
//! Inbound messages arrive as webhook POSTs (see `server`), outbound replies
//! and media downloads go through the Graph API (see `client`).

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::relay::{InboundMessage, MediaRef, Payload};

pub mod client;
pub mod server;

/// Header carrying the HMAC of the webhook body
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

// Cloud API webhook payloads. Only the fields the relay reads are modelled.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
pub struct Change {
    pub field: String,
    pub value: ChangeValue,
}

#[derive(Debug, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub messages: Vec<WebhookMessage>,
}

#[derive(Debug, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub display_phone_number: String,
    #[serde(default)]
    pub phone_number_id: String,
}

#[derive(Debug, Deserialize)]
pub struct WebhookMessage {
    pub from: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextBody>,
    #[serde(default)]
    pub image: Option<ImageBody>,
}

#[derive(Debug, Deserialize)]
pub struct TextBody {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct ImageBody {
    pub id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

fn digits(number: &str) -> String {
    number.chars().filter(char::is_ascii_digit).collect()
}

/// Turn a webhook payload into relay messages.
///
/// `business_number` overrides the number reported in the webhook metadata
/// when deciding which messages are our own.
pub fn extract_messages(payload: WebhookPayload, business_number: Option<&str>) -> Vec<InboundMessage> {
    if payload.object != "whatsapp_business_account" {
        return Vec::new();
    }

    let mut out = Vec::new();
    for change in payload.entry.into_iter().flat_map(|e| e.changes) {
        if change.field != "messages" {
            continue;
        }

        let own_number = business_number
            .map(digits)
            .or_else(|| change.value.metadata.as_ref().map(|m| digits(&m.display_phone_number)))
            .filter(|n| !n.is_empty());

        for msg in change.value.messages {
            let payload = match (msg.kind.as_str(), msg.text, msg.image) {
                ("text", Some(text), _) => Payload::Text(text.body),
                ("image", _, Some(image)) => Payload::Image(MediaRef {
                    id: image.id,
                    mime_type: image.mime_type,
                }),
                (kind, _, _) => {
                    tracing::debug!(kind, id = %msg.id, "ignoring unsupported whatsapp message type");
                    continue;
                }
            };

            let from_me = own_number.as_deref() == Some(digits(&msg.from).as_str());
            out.push(InboundMessage {
                chat_id: msg.from.clone(),
                sender: msg.from,
                id: msg.id,
                from_me,
                payload,
            });
        }
    }
    out
}

/// Check `sha256=<hex>` against HMAC-SHA256(secret, body).
pub fn verify_signature(secret: &str, body: &[u8], header: Option<&str>) -> bool {
    let Some(hex_sig) = header.and_then(|h| h.strip_prefix("sha256=")) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig.trim()) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
pub(crate) fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "102290129340398",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {"display_phone_number": "15550783881", "phone_number_id": "106540352242922"},
                    "contacts": [{"profile": {"name": "Sheena"}, "wa_id": "16505551234"}],
                    "messages": [
                        {"from": "16505551234", "id": "wamid.text", "timestamp": "1749416383", "type": "text",
                         "text": {"body": "Breaking: the moon has been sold to a private company"}},
                        {"from": "16505551234", "id": "wamid.image", "timestamp": "1749416384", "type": "image",
                         "image": {"id": "1003383421387256", "mime_type": "image/jpeg", "sha256": "abc",
                                   "caption": "is this poster real?"}},
                        {"from": "16505551234", "id": "wamid.sticker", "timestamp": "1749416385", "type": "sticker",
                         "sticker": {"id": "1"}},
                        {"from": "15550783881", "id": "wamid.echo", "timestamp": "1749416386", "type": "text",
                         "text": {"body": "a message this account sent itself"}}
                    ]
                }
            }]
        }]
    }"#;

    #[test]
    fn extracts_text_and_image_messages() {
        let payload: WebhookPayload = serde_json::from_str(PAYLOAD).unwrap();
        let messages = extract_messages(payload, None);

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].id, "wamid.text");
        assert_eq!(messages[0].chat_id, "16505551234");
        assert!(matches!(&messages[0].payload, Payload::Text(t) if t.starts_with("Breaking")));
        assert_eq!(
            messages[1].payload,
            Payload::Image(MediaRef {
                id: "1003383421387256".into(),
                mime_type: Some("image/jpeg".into()),
            })
        );
        assert!(!messages[0].from_me);
        assert!(messages[2].from_me);
    }

    #[test]
    fn configured_business_number_wins() {
        let payload: WebhookPayload = serde_json::from_str(PAYLOAD).unwrap();
        let messages = extract_messages(payload, Some("+1 (650) 555-1234"));
        assert!(messages.iter().filter(|m| m.id != "wamid.echo").all(|m| m.from_me));
        assert!(!messages.iter().find(|m| m.id == "wamid.echo").unwrap().from_me);
    }

    #[test]
    fn ignores_other_objects_and_fields() {
        let payload: WebhookPayload = serde_json::from_str(
            r#"{"object": "page", "entry": [{"id": "1", "changes": []}]}"#,
        )
        .unwrap();
        assert!(extract_messages(payload, None).is_empty());

        let statuses: WebhookPayload = serde_json::from_str(
            r#"{"object": "whatsapp_business_account", "entry": [{"id": "1", "changes": [
                {"field": "message_template_status_update", "value": {}}
            ]}]}"#,
        )
        .unwrap();
        assert!(extract_messages(statuses, None).is_empty());
    }

    #[test]
    fn signature_roundtrip_and_rejection() {
        let body = br#"{"object":"whatsapp_business_account"}"#;
        let header = sign("app-secret", body);

        assert!(verify_signature("app-secret", body, Some(&header)));
        assert!(!verify_signature("other-secret", body, Some(&header)));
        assert!(!verify_signature("app-secret", b"tampered", Some(&header)));
        assert!(!verify_signature("app-secret", body, None));
        assert!(!verify_signature("app-secret", body, Some("sha1=deadbeef")));
        assert!(!verify_signature("app-secret", body, Some("sha256=zz")));
    }
}
