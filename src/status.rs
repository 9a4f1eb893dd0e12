//! Upload status documents.
//!
//! A PUT is answered with `<status code="..."/>` plus prose nobody can use
//! programmatically. The code strings map onto POSIX errnos; codes not in
//! the table count as success, because the server grows new informational
//! codes faster than anyone can enumerate them.

use std::io::Read;

use quick_xml::{Reader, events::Event};
use rustix::io::Errno;

use crate::error::FsError;

const STATUS_CODES: &[(&str, Errno)] = &[
    ("access_no_permission", Errno::PERM),
    ("binary_download_no_permission", Errno::PERM),
    ("change_attribute_no_permission", Errno::PERM),
    ("change_package_protection_level", Errno::PERM),
    ("change_project_no_permission", Errno::PERM),
    ("change_project_protection_level", Errno::PERM),
    ("cmd_execution_no_permission", Errno::PERM),
    ("create_project_no_permission", Errno::PERM),
    ("delete_file_no_permission", Errno::PERM),
    ("delete_project_no_permission", Errno::PERM),
    ("delete_project_pubkey_no_permission", Errno::PERM),
    ("double_branch_package", Errno::EXIST),
    ("download_binary_no_permission", Errno::PERM),
    ("illegal_request", Errno::INVAL),
    ("internal_error", Errno::BADF),
    ("invalid_filelist", Errno::INVAL),
    ("invalid_flag", Errno::INVAL),
    ("invalid_package_name", Errno::INVAL),
    ("invalid_project_name", Errno::INVAL),
    ("invalid_xml", Errno::INVAL),
    ("modify_project_no_permission", Errno::PERM),
    ("no_matched_binaries", Errno::NOENT),
    ("not_found", Errno::NOENT),
    ("project_name_mismatch", Errno::INVAL),
    ("put_file_no_permission", Errno::PERM),
    ("put_project_config_no_permission", Errno::PERM),
    ("save_error", Errno::IO),
    ("source_access_no_permission", Errno::PERM),
    ("spec_file_exists", Errno::EXIST),
    ("unknown_operation", Errno::INVAL),
    ("unknown_package", Errno::NOENT),
    ("unknown_project", Errno::NOENT),
    ("unknown_repository", Errno::NOENT),
];

fn errno_for(code: &str) -> Option<Errno> {
    STATUS_CODES.iter().find(|(c, _)| *c == code).map(|(_, errno)| *errno)
}

/// Read an upload response and check its status code.
///
/// `Ok(())` for success codes and for codes we do not know; an
/// [`FsError::Server`] carrying the matching errno otherwise.
pub fn check_status<R: Read>(mut body: R) -> Result<(), FsError> {
    let mut text = String::new();
    body.read_to_string(&mut text)
        .map_err(|err| FsError::Transport(format!("reading status reply: {err}")))?;
    tracing::debug!(reply = %text.trim(), "upload status document");

    let mut reader = Reader::from_str(&text);
    let mut result = Ok(());
    loop {
        match reader.read_event() {
            Err(err) => return Err(FsError::InvalidXml(err.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e) | Event::Empty(e)) if e.local_name().as_ref() == b"status" => {
                for attr in e.attributes() {
                    let attr = attr.map_err(|err| FsError::InvalidXml(err.to_string()))?;
                    if attr.key.local_name().as_ref() != b"code" {
                        continue;
                    }
                    let code = attr
                        .unescape_value()
                        .map_err(|err| FsError::InvalidXml(err.to_string()))?;
                    if let Some(errno) = errno_for(&code) {
                        result = Err(FsError::Server {
                            code: code.into_owned(),
                            errno: errno.raw_os_error(),
                        });
                    }
                }
            }
            Ok(_) => {}
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_codes_pass() {
        assert_eq!(check_status(&b"<status code=\"ok\"/>"[..]), Ok(()));
        // Unknown codes count as success.
        assert_eq!(check_status(&b"<status code=\"shiny_new_code\"/>"[..]), Ok(()));
        assert_eq!(check_status(&b"<whatever/>"[..]), Ok(()));
    }

    #[test]
    fn error_codes_map_to_errnos() {
        let cases = [
            ("access_no_permission", Errno::PERM),
            ("spec_file_exists", Errno::EXIST),
            ("invalid_project_name", Errno::INVAL),
            ("not_found", Errno::NOENT),
            ("save_error", Errno::IO),
            ("internal_error", Errno::BADF),
        ];
        for (code, errno) in cases {
            let body = format!("<status code=\"{code}\"><summary>nope</summary></status>");
            let err = check_status(body.as_bytes()).unwrap_err();
            assert_eq!(err.errno(), errno.raw_os_error(), "{code}");
        }
    }

    #[test]
    fn malformed_reply_is_invalid() {
        let err = check_status(&b"<status code=\"ok\""[..]).unwrap_err();
        assert!(matches!(err, FsError::InvalidXml(_)));
    }
}
