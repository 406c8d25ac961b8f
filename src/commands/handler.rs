//! Command Evaluator
//!
//! Maps a decoded [`Command`] to a store effect and a reply [`Frame`].
//! Each command validates its arguments first and only touches the store once
//! they are known to be good; a validation failure becomes an error reply and
//! the connection carries on.
//!
//! ## Supported Commands
//!
//! - `PING [message]`
//! - `ECHO message`
//! - `SET key value [EX seconds]`
//! - `GET key`
//! - `DEL key [key ...]`
//! - `EXISTS key [key ...]`
//! - `TTL key`

use crate::protocol::{Command, Frame};
use crate::storage::Store;
use bytes::Bytes;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::trace;

/// Evaluates commands against the shared store.
#[derive(Debug, Clone)]
pub struct Evaluator {
    store: Arc<Store>,
}

impl Evaluator {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Evaluates `command` and writes the encoded reply to `out`.
    ///
    /// The reply is written with a single `write_all`; any write failure is
    /// returned to the caller, which owns the connection's lifecycle.
    pub fn eval_and_respond<W: Write + ?Sized>(
        &self,
        command: &Command,
        out: &mut W,
    ) -> io::Result<()> {
        let reply = self.execute(command);
        let mut buf = Vec::with_capacity(64);
        reply.serialize_into(&mut buf);
        out.write_all(&buf)
    }

    /// Evaluates `command` and returns the reply frame.
    pub fn execute(&self, command: &Command) -> Frame {
        trace!(command = %command.name, args = command.args.len(), "Evaluating command");

        let args = command.args.as_slice();
        match command.name.as_str() {
            "PING" => self.cmd_ping(args),
            "ECHO" => self.cmd_echo(args),
            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "DEL" => self.cmd_del(args),
            "EXISTS" => self.cmd_exists(args),
            "TTL" => self.cmd_ttl(args),
            name => Frame::error(format!("ERR unknown command '{}'", name)),
        }
    }

    /// PING [message]
    fn cmd_ping(&self, args: &[Bytes]) -> Frame {
        match args {
            [] => Frame::pong(),
            [message] => Frame::bulk_string(message.clone()),
            _ => wrong_arity("PING"),
        }
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[Bytes]) -> Frame {
        match args {
            [message] => Frame::bulk_string(message.clone()),
            _ => wrong_arity("ECHO"),
        }
    }

    /// SET key value [EX seconds]
    fn cmd_set(&self, args: &[Bytes]) -> Frame {
        if args.len() < 2 {
            return wrong_arity("SET");
        }

        let mut ttl_ms = -1;
        let mut i = 2;
        while i < args.len() {
            if !args[i].eq_ignore_ascii_case(b"EX") {
                return Frame::error("ERR syntax error");
            }

            // Seconds follow the option itself, wherever it appears
            let Some(raw) = args.get(i + 1) else {
                return wrong_arity("SET");
            };
            let Some(seconds) = parse_integer(raw) else {
                return not_an_integer();
            };
            ttl_ms = match seconds.checked_mul(1000) {
                Some(ms) if ms >= 0 => ms,
                _ => return Frame::error("ERR invalid expire time in 'SET' command"),
            };
            i += 2;
        }

        let object = self.store.new_object(args[1].clone(), ttl_ms);
        self.store.put(args[0].clone(), object);
        Frame::ok()
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> Frame {
        match args {
            [key] => match self.store.get(key) {
                Some(object) => Frame::bulk_string(object.value),
                None => Frame::null_bulk(),
            },
            _ => wrong_arity("GET"),
        }
    }

    /// DEL key [key ...]
    fn cmd_del(&self, args: &[Bytes]) -> Frame {
        if args.is_empty() {
            return wrong_arity("DEL");
        }
        let deleted = args.iter().filter(|key| self.store.delete(key)).count();
        Frame::integer(deleted as i64)
    }

    /// EXISTS key [key ...]
    fn cmd_exists(&self, args: &[Bytes]) -> Frame {
        if args.is_empty() {
            return wrong_arity("EXISTS");
        }
        let count = args.iter().filter(|key| self.store.exists(key)).count();
        Frame::integer(count as i64)
    }

    /// TTL key
    ///
    /// Seconds remaining (rounded), `-1` without expiry, `-2` when missing.
    fn cmd_ttl(&self, args: &[Bytes]) -> Frame {
        match args {
            [key] => match self.store.ttl_ms(key) {
                None => Frame::integer(-2),
                Some(-1) => Frame::integer(-1),
                Some(ms) => Frame::integer((ms + 500) / 1000),
            },
            _ => wrong_arity("TTL"),
        }
    }
}

fn wrong_arity(name: &str) -> Frame {
    Frame::error(format!(
        "ERR wrong number of arguments for '{}' command",
        name
    ))
}

fn not_an_integer() -> Frame {
    Frame::error("ERR value is not an integer or out of range")
}

fn parse_integer(raw: &[u8]) -> Option<i64> {
    std::str::from_utf8(raw).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode_command;
    use std::time::Duration;

    fn create_evaluator() -> (Evaluator, Arc<Store>) {
        let store = Arc::new(Store::new());
        (Evaluator::new(Arc::clone(&store)), store)
    }

    fn respond(evaluator: &Evaluator, wire: &[u8]) -> Vec<u8> {
        let (command, _) = decode_command(wire).unwrap().unwrap();
        let mut out = Vec::new();
        evaluator.eval_and_respond(&command, &mut out).unwrap();
        out
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_ping() {
        let (evaluator, _) = create_evaluator();

        assert_eq!(evaluator.execute(&Command::new("PING", &[])), Frame::pong());
        assert_eq!(
            evaluator.execute(&Command::new("PING", &["hello"])),
            Frame::bulk_string("hello")
        );
        assert_eq!(
            evaluator.execute(&Command::new("PING", &["a", "b"])),
            Frame::error("ERR wrong number of arguments for 'PING' command")
        );
    }

    #[test]
    fn test_ping_wire_replies() {
        let (evaluator, _) = create_evaluator();

        assert_eq!(respond(&evaluator, b"*1\r\n$4\r\nPING\r\n"), b"+PONG\r\n");
        assert_eq!(
            respond(&evaluator, b"*2\r\n$4\r\nPING\r\n$5\r\nhello\r\n"),
            b"$5\r\nhello\r\n"
        );
        assert!(respond(&evaluator, b"*3\r\n$4\r\nping\r\n$1\r\na\r\n$1\r\nb\r\n").starts_with(b"-"));
    }

    #[test]
    fn test_echo() {
        let (evaluator, _) = create_evaluator();
        assert_eq!(
            evaluator.execute(&Command::new("ECHO", &["hi"])),
            Frame::bulk_string("hi")
        );
        assert!(evaluator.execute(&Command::new("ECHO", &[])).is_error());
    }

    #[test]
    fn test_set_then_get() {
        let (evaluator, store) = create_evaluator();

        assert_eq!(
            respond(&evaluator, b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n"),
            b"+OK\r\n"
        );
        assert_eq!(
            respond(&evaluator, b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n"),
            b"$3\r\nbar\r\n"
        );
        assert!(store.get(&Bytes::from("foo")).unwrap().expires_at.is_none());
    }

    #[test]
    fn test_get_missing_is_null() {
        let (evaluator, _) = create_evaluator();
        assert_eq!(
            evaluator.execute(&Command::new("GET", &["nope"])),
            Frame::null_bulk()
        );
    }

    #[test]
    fn test_set_missing_value_does_not_touch_store() {
        let (evaluator, store) = create_evaluator();

        let reply = respond(&evaluator, b"*2\r\n$3\r\nSET\r\n$3\r\nfoo\r\n");
        assert_eq!(
            reply,
            b"-ERR wrong number of arguments for 'SET' command\r\n".to_vec()
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_set_with_ex() {
        let (evaluator, store) = create_evaluator();

        let reply = evaluator.execute(&Command::new("SET", &["k", "v", "ex", "100"]));
        assert_eq!(reply, Frame::ok());

        let ttl = store.ttl_ms(&Bytes::from("k")).unwrap();
        assert!(ttl > 99_000 && ttl <= 100_000);
        assert_eq!(
            evaluator.execute(&Command::new("TTL", &["k"])),
            Frame::integer(100)
        );
    }

    #[test]
    fn test_set_ex_reads_seconds_after_option() {
        let (evaluator, store) = create_evaluator();

        // Repeated EX: the last one wins, each read from its own position
        let reply = evaluator.execute(&Command::new("SET", &["k", "v", "EX", "bad", "EX", "5"]));
        assert_eq!(reply, Frame::error("ERR value is not an integer or out of range"));
        assert!(store.is_empty());

        let reply = evaluator.execute(&Command::new("SET", &["k", "v", "EX", "1000", "EX", "5"]));
        assert_eq!(reply, Frame::ok());
        assert_eq!(evaluator.execute(&Command::new("TTL", &["k"])), Frame::integer(5));
    }

    #[test]
    fn test_set_ex_zero_expires_immediately() {
        let (evaluator, _) = create_evaluator();

        evaluator.execute(&Command::new("SET", &["k", "v", "EX", "0"]));
        assert_eq!(
            evaluator.execute(&Command::new("GET", &["k"])),
            Frame::null_bulk()
        );
    }

    #[test]
    fn test_set_ex_expires() {
        let (evaluator, _) = create_evaluator();

        evaluator.execute(&Command::new("SET", &["k", "v", "EX", "1"]));
        assert_eq!(
            evaluator.execute(&Command::new("GET", &["k"])),
            Frame::bulk_string("v")
        );

        std::thread::sleep(Duration::from_millis(1100));
        assert_eq!(
            evaluator.execute(&Command::new("GET", &["k"])),
            Frame::null_bulk()
        );
    }

    #[test]
    fn test_set_option_errors() {
        let (evaluator, store) = create_evaluator();

        assert_eq!(
            evaluator.execute(&Command::new("SET", &["k", "v", "EX"])),
            Frame::error("ERR wrong number of arguments for 'SET' command")
        );
        assert_eq!(
            evaluator.execute(&Command::new("SET", &["k", "v", "PX", "10"])),
            Frame::error("ERR syntax error")
        );
        assert_eq!(
            evaluator.execute(&Command::new("SET", &["k", "v", "EX", "ten"])),
            Frame::error("ERR value is not an integer or out of range")
        );
        assert_eq!(
            evaluator.execute(&Command::new("SET", &["k", "v", "EX", "-1"])),
            Frame::error("ERR invalid expire time in 'SET' command")
        );
        assert_eq!(
            evaluator.execute(&Command::new("SET", &["k", "v", "EX", "9223372036854775807"])),
            Frame::error("ERR invalid expire time in 'SET' command")
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_del_and_exists() {
        let (evaluator, _) = create_evaluator();

        evaluator.execute(&Command::new("SET", &["k1", "v1"]));
        evaluator.execute(&Command::new("SET", &["k2", "v2"]));

        assert_eq!(
            evaluator.execute(&Command::new("EXISTS", &["k1", "k2", "k3"])),
            Frame::integer(2)
        );
        assert_eq!(
            evaluator.execute(&Command::new("DEL", &["k1", "k2", "k3"])),
            Frame::integer(2)
        );
        assert_eq!(
            evaluator.execute(&Command::new("EXISTS", &["k1"])),
            Frame::integer(0)
        );
        assert!(evaluator.execute(&Command::new("DEL", &[])).is_error());
    }

    #[test]
    fn test_ttl_states() {
        let (evaluator, _) = create_evaluator();

        assert_eq!(
            evaluator.execute(&Command::new("TTL", &["missing"])),
            Frame::integer(-2)
        );
        evaluator.execute(&Command::new("SET", &["k", "v"]));
        assert_eq!(
            evaluator.execute(&Command::new("TTL", &["k"])),
            Frame::integer(-1)
        );
    }

    #[test]
    fn test_unknown_command() {
        let (evaluator, store) = create_evaluator();

        assert_eq!(
            evaluator.execute(&Command::new("FLY", &["k"])),
            Frame::error("ERR unknown command 'FLY'")
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_write_failure_is_surfaced() {
        let (evaluator, _) = create_evaluator();

        let err = evaluator
            .eval_and_respond(&Command::new("PING", &[]), &mut BrokenPipe)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
