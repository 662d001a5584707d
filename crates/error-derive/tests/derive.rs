use std::{error::Error as _, io, num::ParseIntError};

use error_derive::Error;

#[derive(Debug, Error)]
enum Error {
    #[msg = "nothing happened"]
    Nothing,

    #[msg = "cannot use {0}"]
    Unusable(String),

    #[msg = "reading failed"]
    Read(#[source] io::Error),

    #[msg = "not a number"]
    NotANumber(#[from] ParseIntError),
}

#[test]
fn messages() {
    assert_eq!(Error::Nothing.to_string(), "nothing happened");
    assert_eq!(
        Error::Unusable("eth0".to_string()).to_string(),
        "cannot use eth0"
    );
    assert_eq!(
        Error::Read(io::ErrorKind::TimedOut.into()).to_string(),
        "reading failed"
    );
}

#[test]
fn sources() {
    assert!(Error::Nothing.source().is_none());
    assert!(Error::Unusable("eth0".to_string()).source().is_none());

    let read = Error::Read(io::ErrorKind::TimedOut.into());
    let source = read.source().unwrap();
    assert!(source.downcast_ref::<io::Error>().is_some());
}

#[test]
fn conversion() {
    fn parse(value: &str) -> Result<u8, Error> {
        Ok(value.parse()?)
    }

    assert_eq!(parse("42").unwrap(), 42);

    let error = parse("forty-two").unwrap_err();
    assert!(matches!(error, Error::NotANumber(_)));
    assert!(error.source().is_some());
}
