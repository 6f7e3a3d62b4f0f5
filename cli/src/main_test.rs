use super::*;

#[test]
fn parse_method_is_case_insensitive() {
    assert_eq!(parse_method("get").unwrap(), Method::GET);
    assert_eq!(parse_method("Delete").unwrap(), Method::DELETE);
}

#[test]
fn parse_method_rejects_garbage() {
    assert!(matches!(parse_method("not a method"), Err(CliError::InvalidMethod(_))));
}

#[test]
fn raw_call_carries_json_body() {
    let call = raw_call(RawArgs {
        method: "post".into(),
        endpoint: "/api/problems/3/mastery".into(),
        data: Some(r#"{"level":2}"#.into()),
    })
    .unwrap();

    assert_eq!(call.endpoint, "/api/problems/3/mastery");
    assert_eq!(*call.options.method(), Method::POST);
}

#[test]
fn raw_call_rejects_invalid_json() {
    let result = raw_call(RawArgs { method: "post".into(), endpoint: "/api/x".into(), data: Some("{".into()) });
    assert!(matches!(result, Err(CliError::InvalidJson(_))));
}

#[test]
fn file_name_falls_back_for_bare_paths() {
    assert_eq!(file_name(Path::new("/tmp/photo.jpg")), "photo.jpg");
    assert_eq!(file_name(Path::new("/")), "upload");
}

#[test]
fn explicit_flags_override_env_config() {
    let config = load_config(Some("https://tutor.example/"), Some(PathBuf::from("/tmp/t.json"))).unwrap();
    assert_eq!(config.api_url, "https://tutor.example");
    assert_eq!(config.token_file, PathBuf::from("/tmp/t.json"));
}

#[test]
fn invalid_api_url_is_config_error() {
    assert!(matches!(load_config(Some("ftp://nope"), None), Err(CliError::Client(ClientError::Config(_)))));
}

#[test]
fn cli_parses_problem_filters() {
    let cli = Cli::try_parse_from(["mathrob", "problems", "--mastery", "1", "--limit", "5"]).unwrap();
    assert!(matches!(cli.command, Command::Problems { mastery: Some(1), limit: Some(5) }));
}

#[test]
fn non_success_response_is_error() {
    let response = ApiResponse::new(404, reqwest::header::HeaderMap::new(), b"missing".to_vec());
    assert!(matches!(print_response(&response), Err(CliError::Server { status: 404, .. })));
}
