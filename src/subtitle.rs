use std::path::Path;
use tokio::fs;
use tracing::info;

use crate::error::Result;
use crate::translate::TranslatedChunk;

const EMPTY_CUE: &str = "[No text]";

/// Render one SRT cue per chunk, in chunk order
pub fn render_srt(chunks: &[TranslatedChunk]) -> String {
    let mut srt_content = String::new();

    for (index, chunk) in chunks.iter().enumerate() {
        let text = chunk.text.trim();
        srt_content.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            index + 1,
            format_srt_time(chunk.start_s),
            format_srt_time(chunk.end_s),
            if text.is_empty() { EMPTY_CUE } else { text }
        ));
    }
    srt_content
}

/// Generate SRT subtitle file from translated chunks
pub async fn generate_srt<P: AsRef<Path>>(chunks: &[TranslatedChunk], output_path: P) -> Result<()> {
    let output_path = output_path.as_ref();
    info!("Generating SRT file: {}", output_path.display());
    fs::write(output_path, render_srt(chunks)).await?;
    Ok(())
}

/// Plain Pashto transcript, one chunk per line
pub async fn write_transcript<P: AsRef<Path>>(chunks: &[TranslatedChunk], output_path: P) -> Result<()> {
    let output_path = output_path.as_ref();
    let mut transcript: String = chunks
        .iter()
        .map(|c| c.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    transcript.push('\n');
    fs::write(output_path, transcript).await?;
    info!("Transcript written to {}", output_path.display());
    Ok(())
}

/// Format time in seconds to SRT time format (HH:MM:SS,mmm)
pub fn format_srt_time(seconds: f64) -> String {
    let total_milliseconds = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_milliseconds / 3_600_000;
    let minutes = (total_milliseconds % 3_600_000) / 60_000;
    let secs = (total_milliseconds % 60_000) / 1_000;
    let millis = total_milliseconds % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}
