use std::path::Path;
use std::time::Duration;

use crate::process::ExternalCommand;

/// Abstract media processing command representation
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    pub fn copy_video(self) -> Self {
        self.video_codec("copy")
    }

    /// Disable video
    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    /// Map one stream from one input
    pub fn map<S: Into<String>>(self, spec: S) -> Self {
        self.arg("-map").arg(spec)
    }

    pub fn audio_sample_rate(self, rate: u32) -> Self {
        self.arg("-ar").arg(rate.to_string())
    }

    pub fn audio_channels(self, channels: u32) -> Self {
        self.arg("-ac").arg(channels.to_string())
    }

    /// Add audio filter
    pub fn audio_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-filter:a").arg(filter)
    }

    /// Mono 16-bit PCM at the given rate
    pub fn pcm_mono(self, rate: u32) -> Self {
        self.audio_channels(1).audio_sample_rate(rate).arg("-acodec").arg("pcm_s16le")
    }

    /// Convert into a runnable process with the given timeout
    pub fn into_external(self, timeout: Duration) -> ExternalCommand {
        ExternalCommand::new(self.binary_path, self.description)
            .args(self.args)
            .timeout(timeout)
    }
}

/// Split a tempo factor into a chain of `atempo` filters, each within the
/// [0.5, 2.0] range the filter accepts.
pub fn atempo_chain(tempo: f64) -> Option<String> {
    if !(tempo > 0.0) || !tempo.is_finite() {
        return None;
    }
    let mut factors = Vec::new();
    let mut remaining = tempo;
    while remaining > 2.0 {
        factors.push(2.0);
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        factors.push(0.5);
        remaining /= 0.5;
    }
    factors.push(remaining);
    Some(
        factors
            .iter()
            .map(|f| format!("atempo={:.6}", f))
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// Builder for common media processing operations
pub struct MediaCommandBuilder {
    binary_path: String,
    probe_path: String,
    sample_rate: u32,
}

impl MediaCommandBuilder {
    /// Create a new command builder
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, probe_path: S2, sample_rate: u32) -> Self {
        Self {
            binary_path: binary_path.into(),
            probe_path: probe_path.into(),
            sample_rate,
        }
    }

    /// Build audio extraction command
    pub fn extract_audio<P: AsRef<Path>>(&self, video_path: P, audio_path: P) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Audio extraction")
            .overwrite()
            .input(video_path)
            .no_video()
            .pcm_mono(self.sample_rate)
            .output(audio_path)
    }

    /// Build a duration probe returning ffprobe JSON on stdout
    pub fn probe_duration<P: AsRef<Path>>(&self, media_path: P) -> MediaCommand {
        MediaCommand::new(&self.probe_path, "Duration probe")
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("json")
            .output(media_path)
    }

    /// Build a tempo change; `tempo` > 1 shortens the audio
    pub fn time_stretch<P: AsRef<Path>>(&self, input: P, output: P, atempo: &str) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Audio time stretch")
            .overwrite()
            .input(input)
            .audio_filter(atempo)
            .pcm_mono(self.sample_rate)
            .output(output)
    }

    /// Build a silence pad up to an exact total duration
    pub fn pad_to_duration<P: AsRef<Path>>(&self, input: P, output: P, target_secs: f64) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Audio pad")
            .overwrite()
            .input(input)
            .audio_filter(format!("apad=whole_dur={:.6}", target_secs))
            .pcm_mono(self.sample_rate)
            .output(output)
    }

    /// Build a concat demuxer run over a list file of absolute paths
    pub fn concat_audio<P: AsRef<Path>>(&self, list_file: P, output: P) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Audio concatenation")
            .overwrite()
            .arg("-f")
            .arg("concat")
            .arg("-safe")
            .arg("0")
            .input(list_file)
            .pcm_mono(self.sample_rate)
            .output(output)
    }

    /// Build any-format to pipeline WAV conversion
    pub fn transcode_to_wav<P: AsRef<Path>>(&self, input: P, output: P) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "WAV transcode")
            .overwrite()
            .input(input)
            .pcm_mono(self.sample_rate)
            .output(output)
    }

    /// Build a mux of the first video stream with the first audio stream of
    /// the second input, leaving the video untouched
    pub fn mux<P: AsRef<Path>>(&self, video: P, audio: P, output: P) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Audio/video mux")
            .overwrite()
            .input(video)
            .input(audio)
            .map("0:v:0")
            .map("1:a:0")
            .copy_video()
            .audio_codec("aac")
            .arg("-shortest")
            .output(output)
    }

    /// Build version check command
    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Version check").arg("-version")
    }
}

/// Render a concat demuxer list; every entry must already be absolute
pub fn concat_list(paths: &[std::path::PathBuf]) -> String {
    paths
        .iter()
        .map(|p| {
            let path = p.to_string_lossy().replace('\\', "/").replace('\'', "'\\''");
            format!("file '{}'", path)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
