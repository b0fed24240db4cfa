pub fn wrap_twiml(twiml: String) -> String {
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>{twiml}")
}

mod twiml {
    use xmlserde_derives::XmlSerialize;

    #[derive(PartialEq, Eq, XmlSerialize)]
    #[xmlserde(root = b"Response")]
    pub struct Response {
        #[xmlserde(ty = "untag")]
        pub actions: Vec<ResponseAction>,
    }

    #[derive(PartialEq, Eq, XmlSerialize)]
    pub enum ResponseAction {
        #[xmlserde(name = b"Say")]
        Say(SayAction),
        #[xmlserde(name = b"Connect")]
        Connect(ConnectAction),
    }

    #[derive(PartialEq, Eq, XmlSerialize, Default)]
    pub struct SayAction {
        #[xmlserde(ty = "text")]
        pub text: String,
        #[xmlserde(name = b"voice", ty = "attr")]
        pub voice: Option<String>,
        #[xmlserde(name = b"language", ty = "attr")]
        pub language: Option<String>,
    }

    #[derive(PartialEq, Eq, XmlSerialize)]
    pub struct ConnectAction {
        #[xmlserde(ty = "untag")]
        pub connection: Connection,
    }

    #[derive(PartialEq, Eq, XmlSerialize)]
    pub enum Connection {
        #[xmlserde(name = b"Stream")]
        Stream(StreamAction),
    }

    #[derive(PartialEq, Eq, XmlSerialize, Default)]
    pub struct StreamAction {
        #[xmlserde(name = b"url", ty = "attr")]
        pub url: String,
        #[xmlserde(name = b"name", ty = "attr")]
        pub name: Option<String>,
    }
}
pub use twiml::*;

/// xmlserde writes attribute values verbatim.
fn escape_attr(value: &str) -> String {
    String::from_utf8_lossy(&quick_xml::escape::escape(value.as_bytes())).into_owned()
}

/// TwiML that bridges the live call to a voice session stream.
pub fn bridge_twiml(url: &str, name: &str) -> String {
    let stream_action = StreamAction {
        url: escape_attr(url),
        name: Some(escape_attr(name)),
    };
    let response = Response {
        actions: vec![ResponseAction::Connect(ConnectAction {
            connection: Connection::Stream(stream_action),
        })],
    };
    wrap_twiml(xmlserde::xml_serialize(response))
}

/// TwiML that speaks `text`.  Twilio hangs up once the document is exhausted.
pub fn say_twiml(text: &str) -> String {
    let say_action = SayAction {
        text: text.to_string(),
        ..Default::default()
    };
    let response = Response {
        actions: vec![ResponseAction::Say(say_action)],
    };
    wrap_twiml(xmlserde::xml_serialize(response))
}

mod reply {
    use axum::response::{IntoResponse, Response};
    use http::{header, HeaderMap, StatusCode};

    /// A call-control document plus the HTTP status it should be served with.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct TwimlReply {
        pub status: StatusCode,
        pub twiml: String,
    }

    impl TwimlReply {
        pub fn ok(twiml: String) -> Self {
            Self {
                status: StatusCode::OK,
                twiml,
            }
        }

        pub fn failed(twiml: String) -> Self {
            Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                twiml,
            }
        }
    }

    impl IntoResponse for TwimlReply {
        fn into_response(self) -> Response {
            let mut headers = HeaderMap::new();
            headers.insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static("application/xml"),
            );
            (self.status, headers, self.twiml).into_response()
        }
    }
}
pub use reply::*;

mod webhook {
    use serde::Deserialize;

    /// Twilio's call status vocabulary, as sent in `CallStatus` form fields.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum CallStatus {
        Queued,
        Initiated,
        Ringing,
        Answered,
        InProgress,
        Completed,
        Busy,
        Failed,
        NoAnswer,
        Canceled,
    }

    impl CallStatus {
        pub fn from_wire(s: &str) -> Option<Self> {
            let status = match s.trim().to_ascii_lowercase().as_str() {
                "queued" => CallStatus::Queued,
                "initiated" => CallStatus::Initiated,
                "ringing" => CallStatus::Ringing,
                "answered" => CallStatus::Answered,
                "in-progress" => CallStatus::InProgress,
                "completed" => CallStatus::Completed,
                "busy" => CallStatus::Busy,
                "failed" => CallStatus::Failed,
                "no-answer" => CallStatus::NoAnswer,
                "canceled" => CallStatus::Canceled,
                _ => return None,
            };
            Some(status)
        }

        pub fn as_str(&self) -> &'static str {
            match self {
                CallStatus::Queued => "queued",
                CallStatus::Initiated => "initiated",
                CallStatus::Ringing => "ringing",
                CallStatus::Answered => "answered",
                CallStatus::InProgress => "in-progress",
                CallStatus::Completed => "completed",
                CallStatus::Busy => "busy",
                CallStatus::Failed => "failed",
                CallStatus::NoAnswer => "no-answer",
                CallStatus::Canceled => "canceled",
            }
        }

        /// The call never reached the patient.
        pub fn is_unreached(&self) -> bool {
            matches!(
                self,
                CallStatus::Busy | CallStatus::Failed | CallStatus::NoAnswer | CallStatus::Canceled
            )
        }
    }

    #[derive(Deserialize, Debug, Default)]
    #[serde(rename_all = "PascalCase")]
    pub struct IncomingCallForm {
        pub call_sid: Option<String>,
        pub from: Option<String>,
        pub to: Option<String>,
    }

    #[derive(Deserialize, Debug, Default)]
    #[serde(rename_all = "PascalCase")]
    pub struct CallStatusForm {
        pub call_sid: Option<String>,
        pub call_status: Option<String>,
    }

    /// Subset of the Call resource Twilio returns from `Calls.json`.
    #[derive(Deserialize, Debug)]
    pub struct CallResource {
        pub sid: String,
    }
}
pub use webhook::*;
