use serde::{Deserialize, Serialize};

pub const SIZE_UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
const SIZE_BASE: u64 = 1024;

/// Human-readable size in base-1024 units, two decimals at most.
///
/// `0` is special-cased to `"0 Bytes"`. Anything from 1024 TB upwards is still
/// expressed in TB since there is no larger unit in the table.
pub fn format_byte_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_owned();
    }

    let mut exponent = 0;
    let mut scale = 1_u64;
    while exponent + 1 < SIZE_UNITS.len() {
        match scale.checked_mul(SIZE_BASE) {
            Some(next) if next <= bytes => {
                scale = next;
                exponent += 1;
            }
            _ => break,
        }
    }

    let value = bytes as f64 / scale as f64;
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, SIZE_UNITS[exponent])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Document,
    Spreadsheet,
    Presentation,
    Image,
    Video,
    Audio,
    Archive,
    Generic,
}

impl FileCategory {
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "pdf" | "doc" | "docx" => FileCategory::Document,
            "xls" | "xlsx" => FileCategory::Spreadsheet,
            "ppt" | "pptx" => FileCategory::Presentation,
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" => FileCategory::Image,
            "mp4" | "mov" | "avi" | "mkv" => FileCategory::Video,
            "mp3" | "wav" | "ogg" => FileCategory::Audio,
            "zip" | "rar" | "7z" | "tar" | "gz" => FileCategory::Archive,
            _ => FileCategory::Generic,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileCategory::Document => "document",
            FileCategory::Spreadsheet => "spreadsheet",
            FileCategory::Presentation => "presentation",
            FileCategory::Image => "image",
            FileCategory::Video => "video",
            FileCategory::Audio => "audio",
            FileCategory::Archive => "archive",
            FileCategory::Generic => "generic",
        }
    }

    /// Icon tag used by the presentation layer.
    pub fn icon_name(self) -> &'static str {
        match self {
            FileCategory::Document => "file-text",
            FileCategory::Spreadsheet => "file-spreadsheet",
            FileCategory::Presentation => "file-presentation",
            FileCategory::Image => "image",
            FileCategory::Video => "video",
            FileCategory::Audio => "music",
            FileCategory::Archive => "archive",
            FileCategory::Generic => "file",
        }
    }
}

impl std::fmt::Display for FileCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category from the text after the last `.`; a name without a dot is
/// looked up whole.
pub fn categorize_file_type(file_name: &str) -> FileCategory {
    let extension = file_name.rsplit('.').next().unwrap_or_default();
    FileCategory::from_extension(extension)
}
