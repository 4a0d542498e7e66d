use super::*;

#[test]
fn http_status_mapping() {
    assert_eq!(PodaciError::Unauthenticated.http_status(), 401);
    let denied = PodaciError::PermissionDenied { user: "u1".into(), access: "read", kind: "file", id: "f".into() };
    assert_eq!(denied.http_status(), 403);
    assert_eq!(PodaciError::not_found("tag", "t1").http_status(), 404);
    assert_eq!(PodaciError::MissingField("hash").http_status(), 400);
    assert_eq!(PodaciError::ConfirmationRequired("delete file").http_status(), 400);
    assert_eq!(PodaciError::Unsupported("promote").http_status(), 501);
    let old = PodaciError::UnsupportedBackend { found: "1.3.0".into(), required: "7.0.0".into() };
    assert_eq!(old.http_status(), 503);
}

#[test]
fn codes_are_snake_case() {
    assert_eq!(PodaciError::absent("tags", "x").code_str(), "absent");
    assert_eq!(PodaciError::InvalidFilename("..".into()).code_str(), "invalid_filename");
    let io = PodaciError::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
    assert_eq!(io.code_str(), "io_error");
}

#[test]
fn messages_name_the_subject() {
    let e = PodaciError::not_found("file", "abc");
    assert_eq!(e.to_string(), "file not found: abc");
    let e = PodaciError::absent("parents", "t9");
    assert_eq!(e.to_string(), "'t9' is not present in parents");
}
