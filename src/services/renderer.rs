//! Turns views into the bytes published to players.

use thiserror::Error;

use crate::dto::views::View;

/// Failure while rendering a view.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The view could not be serialized.
    #[error("failed to serialize `{message_type}` view")]
    Serialize {
        /// Discriminator of the view.
        message_type: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Encoding of outbound views.
pub trait ViewRenderer: Send + Sync {
    /// Bytes for `view`. Equal views render to equal bytes.
    fn render(&self, view: &View) -> Result<Vec<u8>, RenderError>;
}

/// JSON objects tagged with `message_type`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonRenderer;

impl ViewRenderer for JsonRenderer {
    fn render(&self, view: &View) -> Result<Vec<u8>, RenderError> {
        serde_json::to_vec(view).map_err(|source| RenderError::Serialize {
            message_type: view.message_type(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::dto::views::KickedView;

    #[test]
    fn json_carries_the_discriminator() {
        let view = View::Kicked(KickedView {
            room_code: "ABCDE".into(),
        });
        let bytes = JsonRenderer.render(&view).unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["message_type"], "kicked");
        assert_eq!(json["room_code"], "ABCDE");
    }
}
