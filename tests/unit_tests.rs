use certgen::{GenerationRequest, PathOpts, SizingOpts};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
struct TestCli {
    #[command(flatten)]
    sizing: SizingOpts,

    #[command(flatten)]
    paths: PathOpts,
}

#[test]
fn test_sizing_opts_defaults() {
    let cli = TestCli::try_parse_from(["certgen"]).unwrap();

    assert_eq!(cli.sizing.num_clients, 1000);
    assert_eq!(cli.sizing.num_certificates, 2000);
    assert_eq!(cli.sizing.batch_size, None);
    assert_eq!(cli.sizing.num_workers, None);
    assert_eq!(cli.sizing.write_buffer_size, None);
    assert_eq!(cli.paths.db_path, PathBuf::from("data/certificates.db"));
    assert_eq!(cli.paths.output_dir, PathBuf::from("output"));
}

#[test]
fn test_sizing_opts_explicit() {
    let cli = TestCli::try_parse_from([
        "certgen",
        "--num-clients",
        "10",
        "--num-certificates",
        "20",
        "--batch-size",
        "500",
        "--num-workers",
        "2",
        "--write-buffer-size",
        "1000",
        "--db-path",
        "/tmp/x.db",
    ])
    .unwrap();

    let request = GenerationRequest::from(&cli.sizing);
    assert_eq!(
        request,
        GenerationRequest {
            num_clients: 10,
            num_certificates: 20,
            batch_size: Some(500),
            num_workers: Some(2),
            write_buffer_size: Some(1000),
        }
    );
    assert!(request.validate().is_ok());
    assert_eq!(cli.paths.db_path, PathBuf::from("/tmp/x.db"));
}

#[test]
fn test_request_from_json() {
    let request: GenerationRequest =
        serde_json::from_str(r#"{"num_clients": 50, "batch_size": 200}"#).unwrap();

    assert_eq!(request.num_clients, 50);
    assert_eq!(request.num_certificates, 2000);
    assert_eq!(request.batch_size, Some(200));
    assert_eq!(request.num_workers, None);
}
