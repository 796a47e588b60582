use std::io::{stdout, Write};

use anyhow::{bail, Context, Result};
use handlebars::{handlebars_helper, Handlebars};
use here4::{
    dsdl::{self, Classified},
    frame::{decode_frame, decode_header, FrameHeader, TailByte},
};
use serde::Serialize;

use crate::source::parse_candump_line;

#[derive(Debug, Clone)]
pub enum Format {
    Json,
    Text,
}

impl clap::ValueEnum for Format {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Json, Self::Text]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::Json => Some(clap::builder::PossibleValue::new("json")),
            Self::Text => Some(clap::builder::PossibleValue::new("text")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct FrameInfo {
    id: String,
    payload: String,
    header: FrameHeader,
    type_name: Option<&'static str>,
    tail: Option<TailByte>,
    error: Option<String>,
    classified: Option<Classified>,
}

fn inspect(text: &str) -> Result<FrameInfo> {
    let Some(frame) = parse_candump_line(text) else {
        bail!("{text:?} is not an extended frame of the form <8 hex digit id>#<hex payload>");
    };
    let header = decode_header(frame.arbitration_id());
    let type_name = if header.is_service() {
        None
    } else {
        dsdl::type_name(header.type_id)
    };
    let mut info = FrameInfo {
        id: format!("{:#010x}", frame.arbitration_id()),
        payload: hex::encode(frame.payload()),
        header,
        type_name,
        tail: None,
        error: None,
        classified: None,
    };
    match decode_frame(&frame) {
        Ok(decoded) => {
            info.tail = Some(decoded.tail);
            info.classified = Some(dsdl::classify(&decoded));
        }
        Err(err) => info.error = Some(err.to_string()),
    }
    Ok(info)
}

/// Decode and print each frame in `frames`, given in candump `<id>#<payload>` form.
pub fn decode(frames: &[String], format: &Format) -> Result<()> {
    let infos = frames
        .iter()
        .map(|f| inspect(f))
        .collect::<Result<Vec<_>>>()?;

    let mut out = stdout().lock();
    match format {
        Format::Json => {
            serde_json::to_writer_pretty(&mut out, &infos).context("serializing to json")?;
            writeln!(out).context("writing to stdout")
        }
        Format::Text => {
            let data = render_text(&infos)?;
            out.write_all(data.as_bytes()).context("writing to stdout")
        }
    }
}

fn render_text(infos: &[FrameInfo]) -> Result<String> {
    handlebars_helper!(json: |v: Json| v.to_string());
    let mut hb = Handlebars::new();
    hb.register_escape_fn(handlebars::no_escape);
    hb.register_helper("json", Box::new(json));
    hb.register_template_string("frame", TEXT_TEMPLATE)
        .context("compiling frame template")?;
    let mut text = String::new();
    for info in infos {
        text.push_str(&hb.render("frame", info).context("rendering text")?);
    }
    Ok(text)
}

const TEXT_TEMPLATE: &str = r#"{{ id }}#{{ payload }}
  Priority:    {{ header.priority }}
  Kind:        {{ header.kind }}
  Type:        {{ header.type_id }}{{ #if type_name }} ({{ type_name }}){{ /if }}
  Source:      {{ header.source_node_id }}
{{ #if (eq header.kind "Service") }}  Destination: {{ header.destination_node_id }}
  Request:     {{ header.is_request }}
{{ /if }}{{ #if tail }}  Tail:        start={{ tail.start_of_transfer }} end={{ tail.end_of_transfer }} toggle={{ tail.toggle }} transfer_id={{ tail.transfer_id }}
{{ /if }}{{ #if error }}  Error:       {{ error }}
{{ /if }}{{ #if classified }}  Classified:  {{ json classified }}
{{ /if }}"#;
