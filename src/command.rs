//! Argument lists for the relay processes.
//!
//! Everything here is pure: a camera plus the relay settings go in, an argv
//! comes out. The first element is always the program to execute.

use crate::camera::{CameraSource, QualityProfile, Relay};
use crate::redact::Redactor;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_INGEST_URL: &str = "rtmp://a.rtmp.youtube.com/live2";

/// Where the relay binaries live and where their output goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelaySettings {
    pub ffmpeg: String,
    pub streamlink: String,
    pub ingest_url: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            streamlink: "streamlink".to_string(),
            ingest_url: DEFAULT_INGEST_URL.to_string(),
        }
    }
}

impl RelaySettings {
    /// The full ingest locator for a destination key.
    pub fn destination_url(&self, key: &str) -> String {
        format!("{}/{key}", self.ingest_url.trim_end_matches('/'))
    }
}

/// How several cameras are composed into a single picture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    #[default]
    SideBySide,
    Grid,
    Switch,
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Layout::SideBySide => "side-by-side",
            Layout::Grid => "grid",
            Layout::Switch => "switch",
        };
        f.write_str(name)
    }
}

/// A command line ready to spawn, together with a copy that is safe to log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommandPlan {
    pub camera: String,
    #[serde(skip)]
    pub argv: Vec<String>,
    #[serde(rename = "argv")]
    pub redacted: Vec<String>,
    #[serde(skip)]
    pub redactor: Redactor,
}

impl CommandPlan {
    fn new(camera: String, argv: Vec<String>, uris: &[&str], destination: &str) -> Self {
        let redactor = Redactor::new(uris.iter().copied(), [destination]);
        Self {
            camera,
            redacted: redactor.apply_all(&argv),
            argv,
            redactor,
        }
    }

    pub fn for_camera(source: &CameraSource, settings: &RelaySettings) -> Self {
        Self::new(
            source.name.clone(),
            build_command(source, settings),
            &[source.source_uri.as_str()],
            &settings.destination_url(&source.destination_key),
        )
    }

    pub fn combined(
        name: String,
        sources: &[CameraSource],
        layout: Layout,
        switch_interval: u32,
        quality: &QualityProfile,
        destination_key: &str,
        settings: &RelaySettings,
    ) -> Self {
        let destination = settings.destination_url(destination_key);
        let argv = build_combined_command(
            sources,
            layout,
            switch_interval,
            quality,
            &destination,
            &settings.ffmpeg,
        );
        let uris = sources
            .iter()
            .map(|source| source.source_uri.as_str())
            .collect::<Vec<_>>();
        Self::new(name, argv, &uris, &destination)
    }

    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }
}

/// Encoder and muxer arguments shared by every relay flavour.
fn encode_args(quality: &QualityProfile, destination: &str) -> Vec<String> {
    let resolution = quality.resolution.to_string();
    [
        "-c:v",
        "libx264",
        "-preset",
        quality.preset.as_str(),
        "-tune",
        "zerolatency",
        "-b:v",
        quality.bitrate.as_str(),
        "-r",
        quality.framerate.as_str(),
        "-s",
        resolution.as_str(),
        "-pix_fmt",
        "yuv420p",
        "-c:a",
        "aac",
        "-b:a",
        quality.audio_bitrate.as_str(),
        "-f",
        "flv",
        destination,
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// Build the argv relaying one camera to its ingest endpoint.
pub fn build_command(source: &CameraSource, settings: &RelaySettings) -> Vec<String> {
    let quality = source.profile();
    let destination = settings.destination_url(&source.destination_key);

    match &source.relay {
        Relay::Ffmpeg => {
            let mut argv = vec![
                settings.ffmpeg.clone(),
                "-rtsp_transport".to_string(),
                "tcp".to_string(),
                "-i".to_string(),
                source.source_uri.clone(),
            ];
            argv.extend(encode_args(&quality, &destination));
            argv
        }
        Relay::Streamlink {
            stream,
            http_headers,
        } => {
            // Streamlink substitutes {playerinput} with its own pipe.
            let mut player_args = vec!["-i".to_string(), "{playerinput}".to_string()];
            player_args.extend(
                encode_args(&quality, &destination)
                    .into_iter()
                    .map(|arg| quote_player_arg(&arg)),
            );

            let mut argv = vec![
                settings.streamlink.clone(),
                "--player".to_string(),
                settings.ffmpeg.clone(),
                "--player-args".to_string(),
                player_args.join(" "),
            ];
            for (name, value) in http_headers {
                argv.push("--http-header".to_string());
                argv.push(format!("{name}={value}"));
            }
            argv.push(source.source_uri.clone());
            argv.push(stream.clone());
            argv
        }
    }
}

/// `--player-args` is split shell-style by Streamlink.
fn quote_player_arg(arg: &str) -> String {
    if arg.contains([' ', '"', '\'']) {
        format!("\"{}\"", arg.replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}

/// Build one FFmpeg command that composes every camera into a single output.
pub fn build_combined_command(
    sources: &[CameraSource],
    layout: Layout,
    switch_interval: u32,
    quality: &QualityProfile,
    destination: &str,
    ffmpeg: &str,
) -> Vec<String> {
    let mut argv = vec![ffmpeg.to_string()];
    for source in sources {
        argv.extend(
            ["-rtsp_transport", "tcp", "-i", source.source_uri.as_str()]
                .into_iter()
                .map(str::to_string),
        );
    }

    let fps = quality.framerate.parse::<f64>().unwrap_or(25.0);
    argv.extend([
        "-filter_complex".to_string(),
        filter_graph(sources.len(), layout, switch_interval, quality),
        "-map".to_string(),
        "[outv]".to_string(),
        "-map".to_string(),
        "0:a?".to_string(),
        "-g".to_string(),
        ((fps * 2.0) as u32).to_string(),
        "-keyint_min".to_string(),
        (fps as u32).to_string(),
    ]);
    argv.extend(encode_args(quality, destination));
    argv
}

/// The `-filter_complex` graph for `count` inputs. The output pad is `[outv]`.
pub fn filter_graph(count: usize, layout: Layout, switch_interval: u32, quality: &QualityProfile) -> String {
    let width = quality.resolution.width();
    let height = quality.resolution.height();
    let count = count.max(1);
    let mut filters = Vec::with_capacity(count + 1);

    match layout {
        Layout::SideBySide => {
            let cell_width = width / count as u32;
            for i in 0..count {
                filters.push(format!("[{i}:v]scale={cell_width}:{height}[v{i}]"));
            }
            let inputs: String = (0..count).map(|i| format!("[v{i}]")).collect();
            filters.push(format!("{inputs}hstack=inputs={count}[outv]"));
        }
        Layout::Grid => {
            let rows = (count as f64).sqrt().ceil() as usize;
            let cols = count.div_ceil(rows);
            let cell_width = width / cols as u32;
            let cell_height = height / rows as u32;
            for i in 0..count {
                filters.push(format!("[{i}:v]scale={cell_width}:{cell_height}[v{i}]"));
            }
            let positions = (0..count)
                .map(|i| {
                    let row = (i / cols) as u32;
                    let col = (i % cols) as u32;
                    format!("{}_{}", col * cell_width, row * cell_height)
                })
                .collect::<Vec<_>>()
                .join("|");
            let inputs: String = (0..count).map(|i| format!("[v{i}]")).collect();
            filters.push(format!(
                "{inputs}xstack=inputs={count}:layout={positions}:fill=black[outv]"
            ));
        }
        Layout::Switch => {
            let interval = switch_interval.max(1);
            let cycle = interval * count as u32;
            for i in 0..count {
                filters.push(format!(
                    "[{i}:v]scale={width}:{height},setpts=PTS-STARTPTS[v{i}]"
                ));
            }
            // camera 0 is the base picture; camera i covers it during its slot
            let mut base = "[v0]".to_string();
            for i in 1..count {
                let start = i as u32 * interval;
                let end = start + interval;
                let out = if i + 1 == count {
                    "[outv]".to_string()
                } else {
                    format!("[tmp{i}]")
                };
                filters.push(format!(
                    "{base}[v{i}]overlay=enable='between(mod(t,{cycle}),{start},{end})'{out}"
                ));
                base = out;
            }
            if count == 1 {
                filters.push("[v0]null[outv]".to_string());
            }
        }
    }

    filters.join(";")
}
