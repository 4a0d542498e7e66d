//! Best-effort MIME detection from leading bytes, refined by file extension.

/// Returned when nothing more specific is known.
pub const OCTET_STREAM: &str = "application/octet-stream";

// (offset, signature, mime). Longer or more specific signatures first.
const MAGIC: &[(usize, &[u8], &str)] = &[
    (0, b"%PDF-", "application/pdf"),
    (0, b"\x89PNG\r\n\x1a\n", "image/png"),
    (0, b"\xFF\xD8\xFF", "image/jpeg"),
    (0, b"GIF87a", "image/gif"),
    (0, b"GIF89a", "image/gif"),
    (0, b"II*\x00", "image/tiff"),
    (0, b"MM\x00*", "image/tiff"),
    (0, b"BM", "image/bmp"),
    (0, b"\x1F\x8B", "application/gzip"),
    (0, b"BZh", "application/x-bzip2"),
    (0, b"7z\xBC\xAF\x27\x1C", "application/x-7z-compressed"),
    (0, b"Rar!\x1A\x07", "application/vnd.rar"),
    (0, b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1", "application/x-ole-storage"),
    (0, b"ID3", "audio/mpeg"),
    (0, b"OggS", "audio/ogg"),
    (0, b"fLaC", "audio/flac"),
    (0, b"\x1A\x45\xDF\xA3", "video/webm"),
    (0, b"{\\rtf", "application/rtf"),
    (4, b"ftyp", "video/mp4"),
];

/// Sniff `head` (the first bytes of a file); `filename` refines container and text formats.
pub fn sniff(head: &[u8], filename: &str) -> String {
    let ext = extension(filename);
    if head.len() >= 12 && &head[0..4] == b"RIFF" {
        match &head[8..12] {
            b"WEBP" => return "image/webp".into(),
            b"WAVE" => return "audio/wav".into(),
            b"AVI " => return "video/x-msvideo".into(),
            _ => {}
        }
    }
    if head.starts_with(b"PK\x03\x04") {
        // OOXML and ODF documents are zip containers
        return ext.as_deref().and_then(from_extension).filter(|m| is_zip_container(m)).unwrap_or("application/zip").into();
    }
    for (offset, sig, mime) in MAGIC {
        if head.len() >= offset + sig.len() && &head[*offset..offset + sig.len()] == *sig {
            if *mime == "application/x-ole-storage" {
                // legacy Office formats share one container signature
                return ext.as_deref().and_then(from_extension).unwrap_or("application/msword").into();
            }
            return (*mime).into();
        }
    }
    if let Some(m) = ext.as_deref().and_then(from_extension) {
        return m.into();
    }
    if looks_like_text(head) {
        return "text/plain".into();
    }
    OCTET_STREAM.into()
}

/// MIME type implied by a lowercase extension.
pub fn from_extension(ext: &str) -> Option<&'static str> {
    Some(match ext {
        "txt" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "xml" => "application/xml",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "rtf" => "application/rtf",
        "doc" => "application/msword",
        "xls" => "application/vnd.ms-excel",
        "ppt" => "application/vnd.ms-powerpoint",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "odt" => "application/vnd.oasis.opendocument.text",
        "ods" => "application/vnd.oasis.opendocument.spreadsheet",
        "eml" => "message/rfc822",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "tif" | "tiff" => "image/tiff",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "zip" => "application/zip",
        _ => return None,
    })
}

/// Lowercased extension of `filename`, if any. Works for URLs too.
pub fn extension(filename: &str) -> Option<String> {
    let last = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let last = last.split(['?', '#']).next().unwrap_or(last);
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn is_zip_container(mime: &str) -> bool {
    mime == "application/zip" || mime.starts_with("application/vnd.openxmlformats") || mime.starts_with("application/vnd.oasis")
}

// Valid UTF-8 (a cut multi-byte tail is fine) without control bytes other than whitespace.
fn looks_like_text(head: &[u8]) -> bool {
    if head.is_empty() {
        return false;
    }
    let valid = match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    };
    valid && !head.iter().any(|&b| b < 0x20 && !matches!(b, b'\n' | b'\r' | b'\t' | 0x0C))
}
