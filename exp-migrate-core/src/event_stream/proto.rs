//! Event-stream protobuf messages.
//!
//! Only the fields the decoder reads are declared; `prost` skips the rest
//! (`file_version`, `graph_def`, summary metadata, ...). Histogram, audio and
//! tensor payloads are kept as raw bytes since they are never interpreted.

/// One record of an event stream.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Event {
    #[prost(double, tag = "1")]
    pub wall_time: f64,
    #[prost(int64, tag = "2")]
    pub step: i64,
    #[prost(message, optional, tag = "5")]
    pub summary: Option<Summary>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Summary {
    #[prost(message, repeated, tag = "1")]
    pub value: Vec<SummaryValue>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SummaryValue {
    #[prost(string, tag = "1")]
    pub tag: String,
    #[prost(oneof = "summary_value::Kind", tags = "2, 3, 4, 5, 6, 8")]
    pub kind: Option<summary_value::Kind>,
}

pub mod summary_value {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Kind {
        #[prost(float, tag = "2")]
        SimpleValue(f32),
        #[prost(bytes, tag = "3")]
        ObsoleteHistogram(Vec<u8>),
        #[prost(message, tag = "4")]
        Image(super::Image),
        #[prost(bytes, tag = "5")]
        Histogram(Vec<u8>),
        #[prost(bytes, tag = "6")]
        Audio(Vec<u8>),
        #[prost(bytes, tag = "8")]
        Tensor(Vec<u8>),
    }

    impl Kind {
        pub fn name(&self) -> &'static str {
            match self {
                Kind::SimpleValue(_) => "simple_value",
                Kind::ObsoleteHistogram(_) => "obsolete_old_style_histogram",
                Kind::Image(_) => "image",
                Kind::Histogram(_) => "histo",
                Kind::Audio(_) => "audio",
                Kind::Tensor(_) => "tensor",
            }
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Image {
    #[prost(int32, tag = "1")]
    pub height: i32,
    #[prost(int32, tag = "2")]
    pub width: i32,
    #[prost(int32, tag = "3")]
    pub colorspace: i32,
    #[prost(bytes, tag = "4")]
    pub encoded_image_string: Vec<u8>,
}

impl Event {
    /// An event carrying one scalar per `(tag, value)` pair.
    pub fn scalars(wall_time: f64, step: i64, values: &[(&str, f32)]) -> Self {
        let value = values
            .iter()
            .map(|(tag, v)| SummaryValue {
                tag: (*tag).to_string(),
                kind: Some(summary_value::Kind::SimpleValue(*v)),
            })
            .collect();
        Self {
            wall_time,
            step,
            summary: Some(Summary { value }),
        }
    }
}
