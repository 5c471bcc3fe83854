//! Tagged output lines of `yt-dlp` and how to read them back.
//!
//! The downloader asks `yt-dlp` to print tab-separated lines with a fixed
//! tag in front, so parsing never depends on the human-readable log format.

use crate::fsutil::strip_ansi_codes;
use crate::source::SourceUpdate;
use std::path::PathBuf;

pub const PROGRESS_TAG: &str = "[progress]";
pub const STAGE_TAG: &str = "[stage]";
pub const INFO_TAG: &str = "[info]";
pub const FINAL_TAG: &str = "[final]";

/// `--progress-template` for download progress.
pub fn download_template() -> String {
    format!(
        "download:{PROGRESS_TAG}\t%(progress._percent_str)s\t%(progress._speed_str)s\t%(progress._eta_str)s\t%(info.title)s"
    )
}

/// `--progress-template` for post-processor progress.
pub fn postprocess_template() -> String {
    format!("postprocess:{STAGE_TAG}\t%(progress.postprocessor)s\t%(progress.status)s")
}

/// `--print` template emitted once per item before it downloads.
pub fn info_template() -> String {
    format!(
        "before_dl:{INFO_TAG}\t%(n_entries)s\t%(thumbnail)s\t%(filesize,filesize_approx)s\t%(playlist_title)s\t%(title)s"
    )
}

/// `--print` template emitted once per item after its file is final.
pub fn final_path_template() -> String {
    format!("after_move:{FINAL_TAG}\t%(filepath)s")
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    Update(SourceUpdate),
    Output(PathBuf),
    Error(String),
    Other,
}

pub fn parse_line(raw: &str) -> ParsedLine {
    let line = strip_ansi_codes(raw);
    let line = line.trim_end_matches(['\r', '\n']);

    if let Some(rest) = line.strip_prefix(PROGRESS_TAG) {
        let mut fields = rest.trim_start_matches('\t').splitn(4, '\t');
        let percent = fields.next().and_then(parse_percent);
        let speed = fields.next().and_then(present);
        let eta = fields.next().and_then(present);
        let title = fields.next().and_then(present);
        return ParsedLine::Update(SourceUpdate::Progress {
            title,
            percent,
            speed,
            eta,
        });
    }

    if let Some(rest) = line.strip_prefix(STAGE_TAG) {
        let mut fields = rest.trim_start_matches('\t').splitn(2, '\t');
        let name = fields.next().and_then(present);
        let status = fields.next().map(str::trim).unwrap_or_default();
        return match name {
            Some(name) if status == "started" => {
                ParsedLine::Update(SourceUpdate::PostProcess { name })
            }
            _ => ParsedLine::Other,
        };
    }

    if let Some(rest) = line.strip_prefix(INFO_TAG) {
        let mut fields = rest.trim_start_matches('\t').splitn(5, '\t');
        let item_count = fields
            .next()
            .and_then(present)
            .and_then(|n| n.parse::<u32>().ok());
        let thumbnail_url = fields.next().and_then(present);
        let approx_size = fields.next().and_then(present).and_then(parse_size);
        let playlist_title = fields.next().and_then(present);
        let title = fields.next().and_then(present).unwrap_or_default();
        return ParsedLine::Update(SourceUpdate::Info {
            title,
            playlist_title,
            item_count,
            thumbnail_url,
            approx_size,
        });
    }

    if let Some(rest) = line.strip_prefix(FINAL_TAG) {
        let path = rest.trim_start_matches('\t').trim();
        return if path.is_empty() {
            ParsedLine::Other
        } else {
            ParsedLine::Output(PathBuf::from(path))
        };
    }

    if let Some(msg) = line.strip_prefix("ERROR:") {
        return ParsedLine::Error(msg.trim().to_string());
    }

    ParsedLine::Other
}

/// `" 42.5%"` -> `0.425`
pub fn parse_percent(field: &str) -> Option<f32> {
    let number = field.trim().strip_suffix('%')?;
    let v = number.trim().parse::<f32>().ok()?;
    Some((v / 100.0).clamp(0.0, 1.0))
}

/// Byte counts come out as integers, or as floats for `filesize_approx`.
fn parse_size(field: String) -> Option<u64> {
    if let Ok(n) = field.parse::<u64>() {
        return Some(n);
    }
    let v = field.parse::<f64>().ok()?;
    (v.is_finite() && v >= 0.0).then(|| v.round() as u64)
}

/// yt-dlp prints `NA` for fields it does not know.
fn present(field: &str) -> Option<String> {
    let field = field.trim();
    match field {
        "" | "NA" | "None" | "Unknown" => None,
        _ => Some(field.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_download_progress() {
        let line = "[progress]\t 42.0%\t  1.21MiB/s\t00:13\tSome Song";
        assert_eq!(
            parse_line(line),
            ParsedLine::Update(SourceUpdate::Progress {
                title: Some("Some Song".into()),
                percent: Some(0.42),
                speed: Some("1.21MiB/s".into()),
                eta: Some("00:13".into()),
            })
        );
    }

    #[test]
    fn progress_with_unknown_fields() {
        let line = "[progress]\t\x1b[0;94m  5.0%\x1b[0m\tUnknown\tNA\tNA";
        match parse_line(line) {
            ParsedLine::Update(SourceUpdate::Progress {
                title,
                percent,
                speed,
                eta,
            }) => {
                assert_eq!(percent, Some(0.05));
                assert_eq!(speed, None);
                assert_eq!(eta, None);
                assert_eq!(title, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn stage_only_on_start() {
        assert_eq!(
            parse_line("[stage]\tExtractAudio\tstarted"),
            ParsedLine::Update(SourceUpdate::PostProcess {
                name: "ExtractAudio".into()
            })
        );
        assert_eq!(parse_line("[stage]\tExtractAudio\tfinished"), ParsedLine::Other);
    }

    #[test]
    fn parses_info_for_playlists_and_singles() {
        let line = "[info]\t12\thttps://i.ytimg.com/x.jpg\t4194304\tMy Mix\tFirst\ttrack";
        assert_eq!(
            parse_line(line),
            ParsedLine::Update(SourceUpdate::Info {
                title: "First\ttrack".into(),
                playlist_title: Some("My Mix".into()),
                item_count: Some(12),
                thumbnail_url: Some("https://i.ytimg.com/x.jpg".into()),
                approx_size: Some(4_194_304),
            })
        );

        let single = "[info]\tNA\tNA\tNA\tNA\tLone video";
        assert_eq!(
            parse_line(single),
            ParsedLine::Update(SourceUpdate::Info {
                title: "Lone video".into(),
                playlist_title: None,
                item_count: None,
                thumbnail_url: None,
                approx_size: None,
            })
        );
    }

    #[test]
    fn approximate_sizes_may_be_fractional() {
        match parse_line("[info]\tNA\tNA\t1048575.6\tNA\tSong") {
            ParsedLine::Update(SourceUpdate::Info { approx_size, .. }) => {
                assert_eq!(approx_size, Some(1_048_576))
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_final_path_and_errors() {
        assert_eq!(
            parse_line("[final]\t/tmp/out/Song.mp3\n"),
            ParsedLine::Output(PathBuf::from("/tmp/out/Song.mp3"))
        );
        assert_eq!(
            parse_line("ERROR: [youtube] abc: Video unavailable"),
            ParsedLine::Error("[youtube] abc: Video unavailable".into())
        );
        assert_eq!(parse_line("[youtube] Extracting URL"), ParsedLine::Other);
    }

    #[test]
    fn percent_is_clamped_fraction() {
        assert_eq!(parse_percent("100%"), Some(1.0));
        assert_eq!(parse_percent("abc%"), None);
        assert_eq!(parse_percent("50"), None);
    }
}
