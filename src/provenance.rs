//! Original filenames travel through the backend's version history.
//!
//! The upload commit message is the only place the client-side filename is
//! persisted. It is written as `original=<name>` and read back by the
//! listing handler. Names containing whitespace come back truncated at the
//! first whitespace character.

pub const ORIGINAL_NAME_MARKER: &str = "original=";

const OVERWRITE_MARKER: &str = " (overwrite)";

/// Commit message for an upload
///
/// `<prefix> <basename>[ (overwrite)][ original=<name>]`; the marker is
/// omitted when the original name equals the stored name.
pub fn upload_message(prefix: &str, original_name: &str, stored_name: &str, overwrite: bool) -> String {
    let shown = if original_name.is_empty() {
        stored_name
    } else {
        basename(original_name)
    };

    let mut message = format!("{} {}", prefix, shown);
    if overwrite {
        message.push_str(OVERWRITE_MARKER);
    }
    if !original_name.is_empty() && original_name != stored_name {
        message.push(' ');
        message.push_str(ORIGINAL_NAME_MARKER);
        message.push_str(original_name);
    }
    message
}

/// Recover the original filename from a commit message
///
/// Returns the text after the marker up to the next whitespace, or an empty
/// string when the marker is absent.
pub fn original_name(message: &str) -> String {
    message
        .find(ORIGINAL_NAME_MARKER)
        .map(|pos| &message[pos + ORIGINAL_NAME_MARKER.len()..])
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or_default()
        .to_string()
}

fn basename(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_message() {
        assert_eq!(
            upload_message("Upload by PicCom", "cat.png", "1234.png", false),
            "Upload by PicCom cat.png original=cat.png"
        );
        assert_eq!(
            upload_message("Upload by PicCom", "cat.png", "1234.png", true),
            "Upload by PicCom cat.png (overwrite) original=cat.png"
        );
        assert_eq!(
            upload_message("Upload by PicCom", "same.png", "same.png", false),
            "Upload by PicCom same.png"
        );
    }

    #[test]
    fn test_original_name() {
        assert_eq!(original_name("Upload by PicCom cat.png original=cat.png"), "cat.png");
        assert_eq!(original_name("x (overwrite) original=a.jpg\n\nbody"), "a.jpg");
        assert_eq!(original_name("original=my photo.png"), "my");
        assert_eq!(original_name("Initial commit"), "");
        assert_eq!(original_name("original="), "");
        assert_eq!(original_name(""), "");
    }

    #[test]
    fn test_round_trip() {
        let message = upload_message("Upload by PicCom", "Report.PDF", "abc.pdf", false);
        assert_eq!(original_name(&message), "Report.PDF");
    }
}
