//! End-to-end tests for hostbridge.
//!
//! These drive a full session over in-memory streams: the "host" side is a
//! pre-recorded inbound script plus a shared output buffer we inspect after
//! the serve loop exits.

use std::cell::RefCell;
use std::io::{self, Cursor, Write};
use std::rc::Rc;

use hostbridge::codec::{decode, encode_call, encode_response, Document};
use hostbridge::{Error, Session, SessionBuilder, SessionState, Value, EX_SOFTWARE, IMPORT_METHOD};

/// Writer whose buffer stays inspectable after the session takes it.
#[derive(Clone, Default)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).unwrap()
    }

    /// Decode every document the session wrote, in order.
    fn documents(&self) -> Vec<Document> {
        self.contents()
            .split("<?xml version='1.0'?>\n")
            .filter(|chunk| !chunk.trim().is_empty())
            .map(|chunk| decode(chunk).expect("session wrote a malformed document"))
            .collect()
    }
}

fn session_over(
    script: &str,
) -> (Session<Cursor<Vec<u8>>, SharedBuf>, SharedBuf) {
    let out = SharedBuf::default();
    let session =
        SessionBuilder::new("pluginA").over(Cursor::new(script.as_bytes().to_vec()), out.clone());
    (session, out)
}

/// Host script: the import call, then one acknowledgement per registration
/// call the session will issue during the handshake, then end-of-stream.
fn import_script(acks: usize) -> String {
    let mut script = encode_call(IMPORT_METHOD, &[]);
    for _ in 0..acks {
        script.push_str(&encode_response(&Value::Int(1)));
    }
    script
}

#[test]
fn test_import_handshake_registers_one_hook() {
    let (mut session, out) = session_over(&import_script(1));
    session
        .hook("pagetemplate", "myhook", |_, _| Ok(None))
        .unwrap();

    session.run().unwrap();
    assert_eq!(session.state(), SessionState::Terminated);

    let docs = out.documents();
    assert_eq!(docs.len(), 2, "expected hook call plus import reply");

    // Exactly one outbound hook registration, carrying all four fields as
    // alternating name/value pairs.
    match &docs[0] {
        Document::Call { method, params } => {
            assert_eq!(method, "hook");
            let expected = [
                Value::from("id"),
                Value::from("pluginA"),
                Value::from("type"),
                Value::from("pagetemplate"),
                Value::from("call"),
                Value::from("myhook"),
                Value::from("last"),
                Value::Bool(false),
            ];
            assert_eq!(params.as_slice(), expected.as_slice());
        }
        other => panic!("expected a hook call, got {other:?}"),
    }

    // The import call itself is answered with the null sentinel.
    match &docs[1] {
        Document::Response(value) => assert!(value.is_null_sentinel()),
        other => panic!("expected the import reply, got {other:?}"),
    }
}

#[test]
fn test_import_handshake_registers_injected_function() {
    let (mut session, out) = session_over(&import_script(1));
    session
        .inject_opts("IkiWiki::quux", "quux", false, |_, params| {
            Ok(params.first().cloned())
        })
        .unwrap();

    session.run().unwrap();

    match &out.documents()[0] {
        Document::Call { method, params } => {
            assert_eq!(method, "inject");
            let expected = [
                Value::from("name"),
                Value::from("IkiWiki::quux"),
                Value::from("call"),
                Value::from("quux"),
                Value::from("memoize"),
                Value::Bool(false),
            ];
            assert_eq!(params.as_slice(), expected.as_slice());
        }
        other => panic!("expected an inject call, got {other:?}"),
    }
}

#[test]
fn test_unknown_method_gets_fault_and_loop_continues() {
    let mut script = encode_call("mystery", &[]);
    script.push_str(&encode_call("known", &[Value::from("page")]));
    let (mut session, out) = session_over(&script);
    session
        .hook("pagetemplate", "known", |_, params| {
            Ok(params.first().cloned())
        })
        .unwrap();

    session.run().unwrap();

    let docs = out.documents();
    assert_eq!(docs.len(), 2);
    match &docs[0] {
        Document::Fault { message, .. } => assert!(message.contains("mystery")),
        other => panic!("expected a fault document, got {other:?}"),
    }
    // The next request was still served.
    assert_eq!(docs[1], Document::Response(Value::from("page")));
}

#[test]
fn test_eof_is_clean_shutdown() {
    let (mut session, out) = session_over("");
    session.hook("pagetemplate", "myhook", |_, _| Ok(None)).unwrap();

    assert!(session.run().is_ok());
    assert_eq!(session.state(), SessionState::Terminated);
    assert!(out.contents().is_empty(), "nothing should have been written");
}

#[test]
fn test_callback_failure_is_reported_then_returned() {
    let script = encode_call("failing", &[]);
    let (mut session, out) = session_over(&script);
    session
        .hook("pagetemplate", "failing", |_, _| {
            Err(Error::Callback("boom".to_string()))
        })
        .unwrap();

    // The error report's own read hits end-of-stream; that is swallowed
    // and the original failure still comes back.
    let err = session.run().unwrap_err();
    assert!(matches!(err, Error::Callback(_)));
    assert_eq!(EX_SOFTWARE, 70);

    match &out.documents()[0] {
        Document::Call { method, params } => {
            assert_eq!(method, "error");
            let msg = params[0].as_str().unwrap();
            assert!(msg.contains("uncaught exception"), "got {msg:?}");
            assert!(msg.contains("boom"), "got {msg:?}");
        }
        other => panic!("expected an error report, got {other:?}"),
    }
}

#[test]
fn test_callback_issues_nested_rpc() {
    let mut script = encode_call("curious", &[]);
    // Reply to the nested getvar, read while the host waits on our answer.
    script.push_str(&encode_response(&Value::from("mywiki")));
    let (mut session, out) = session_over(&script);
    session
        .hook("pagetemplate", "curious", |host, _| {
            host.getvar("config", "wikiname")
        })
        .unwrap();

    session.run().unwrap();

    let docs = out.documents();
    assert_eq!(docs.len(), 2);
    assert!(matches!(
        &docs[0],
        Document::Call { method, .. } if method == "getvar"
    ));
    assert_eq!(docs[1], Document::Response(Value::from("mywiki")));
}

#[test]
fn test_host_shutdown_mid_handshake_is_clean() {
    // Host sends import but closes before acknowledging the registration.
    let script = encode_call(IMPORT_METHOD, &[]);
    let (mut session, _out) = session_over(&script);
    session.hook("pagetemplate", "myhook", |_, _| Ok(None)).unwrap();

    assert!(session.run().is_ok());
    assert_eq!(session.state(), SessionState::Terminated);
}
