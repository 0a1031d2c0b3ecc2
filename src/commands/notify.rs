//! Report a decision to the running daemon over the local protocol

use eyre::{Context, Result, bail, eyre};
use std::io::{BufRead, BufReader, Write};
use std::net::{Ipv4Addr, TcpStream};
use std::time::Duration;

use crate::cli::NotifyCommand;
use crate::confirm::protocol::{ACK, Message};

const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

pub fn message(command: NotifyCommand, hash: String, name: Option<String>) -> Result<Message> {
    let message = match command {
        NotifyCommand::Shown => Message::Shown(hash),
        NotifyCommand::Execute => Message::Execute(hash),
        NotifyCommand::Skip => Message::Skip(hash),
        NotifyCommand::Action => Message::Action {
            name: name.ok_or_else(|| eyre!("`action` requires --name"))?,
            hash,
        },
    };
    // Round-trip through the parser so malformed hashes fail here, not in the daemon
    message.to_string().parse::<Message>().map_err(|e| eyre!("{}", e))
}

/// Send one message and return the daemon's reply line
pub fn send(port: u16, message: &Message) -> Result<String> {
    let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port))
        .context(format!("Failed to connect to pelagos on port {}", port))?;
    stream.set_read_timeout(Some(REPLY_TIMEOUT))?;

    log::debug!("Sending {} to port {}", message, port);
    writeln!(stream, "{}", message).context("Failed to send message")?;

    let mut reply = String::new();
    BufReader::new(stream)
        .read_line(&mut reply)
        .context("No reply from pelagos")?;
    Ok(reply.trim().to_string())
}

pub fn run(command: NotifyCommand, hash: String, name: Option<String>, port: u16) -> Result<()> {
    let message = message(command, hash, name)?;
    let reply = send(port, &message)?;
    if reply != ACK {
        bail!("pelagos rejected {}: {}", message, reply);
    }
    println!("{}", reply);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    const HASH: &str = "0123456789abcdef";

    #[test]
    fn test_message_requires_name_for_action() {
        assert!(message(NotifyCommand::Action, HASH.to_string(), None).is_err());
        assert_eq!(
            message(NotifyCommand::Action, HASH.to_string(), Some("NAS".to_string())).unwrap(),
            Message::Action {
                name: "NAS".to_string(),
                hash: HASH.to_string()
            }
        );
    }

    #[test]
    fn test_message_rejects_bad_hash() {
        assert!(message(NotifyCommand::Execute, "nope".to_string(), None).is_err());
    }

    #[test]
    fn test_send_reads_reply() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let mut stream = stream;
            writeln!(stream, "{}", ACK).unwrap();
            line
        });

        let reply = send(port, &Message::Skip(HASH.to_string())).unwrap();
        assert_eq!(reply, ACK);
        assert_eq!(server.join().unwrap().trim(), format!("SKIP:{}", HASH));
    }
}
