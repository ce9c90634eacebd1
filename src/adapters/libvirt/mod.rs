//! Client for libvirtd's remote protocol over its unix socket.

pub mod protocol;
pub mod xdr;

use crate::config::ConnectionSettings;
use crate::domain::model::Domain;
use crate::domain::ports::Hypervisor;
use crate::utils::error::{JugglerError, Result};
use async_trait::async_trait;
use protocol::{
    format_version, get_domain, get_error, put_domain, Header, Message, Procedure,
    LIST_DOMAINS_ACTIVE, LIST_DOMAINS_INACTIVE, REMOTE_PROGRAM, STATUS_ERROR, STATUS_OK, TYPE_REPLY,
};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use xdr::{XdrReader, XdrWriter};

pub struct LibvirtClient {
    stream: Mutex<UnixStream>,
    serial: AtomicU32,
    endpoint: String,
}

impl LibvirtClient {
    /// Dials the socket (bounded by the configured timeout), opens the
    /// connection URI and logs the daemon's version.
    pub async fn connect(settings: &ConnectionSettings) -> Result<Self> {
        let endpoint = settings.socket.display().to_string();
        tracing::debug!("Dialing libvirt at {}", endpoint);

        let stream = tokio::time::timeout(settings.connect_timeout, UnixStream::connect(&settings.socket))
            .await
            .map_err(|_| JugglerError::Connection {
                endpoint: endpoint.clone(),
                message: format!("timed out after {:?}", settings.connect_timeout),
            })?
            .map_err(|e| JugglerError::Connection {
                endpoint: endpoint.clone(),
                message: format!("failed to dial libvirt: {}", e),
            })?;

        Self::open(stream, endpoint, &settings.uri).await
    }

    /// Performs the protocol handshake on an already connected stream.
    pub async fn open(stream: UnixStream, endpoint: String, uri: &str) -> Result<Self> {
        let client = Self {
            stream: Mutex::new(stream),
            serial: AtomicU32::new(1),
            endpoint,
        };

        let mut args = XdrWriter::new();
        args.put_opt_string(Some(uri)).put_u32(0);
        client
            .call(Procedure::ConnectOpen, args.into_bytes())
            .await
            .map_err(|e| client.connection_error(e))?;

        let version = client
            .version()
            .await
            .map_err(|e| client.connection_error(e))?;
        tracing::info!(
            "Connected to libvirt at {} ({}), version {}",
            client.endpoint,
            uri,
            format_version(version)
        );
        Ok(client)
    }

    fn connection_error(&self, error: JugglerError) -> JugglerError {
        JugglerError::Connection {
            endpoint: self.endpoint.clone(),
            message: error.to_string(),
        }
    }

    /// Sends one call and waits for its reply. Frames for other programs
    /// (keepalive) and unsolicited messages are skipped.
    async fn call(&self, procedure: Procedure, args: Vec<u8>) -> Result<Vec<u8>> {
        let mut stream = self.stream.lock().await;
        let serial = self.serial.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("-> {} serial {}", procedure.name(), serial);

        Message::new(Header::call(procedure, serial), args)
            .write_to(&mut *stream)
            .await?;

        loop {
            let reply = Message::read_from(&mut *stream).await?;
            let header = reply.header;
            if header.program != REMOTE_PROGRAM || header.kind != TYPE_REPLY {
                tracing::trace!(
                    "Ignoring message for program {:#x} type {}",
                    header.program,
                    header.kind
                );
                continue;
            }
            if header.serial != serial || header.procedure != procedure as i32 {
                return Err(JugglerError::Protocol {
                    message: format!(
                        "reply for procedure {} serial {} while waiting for {} serial {}",
                        header.procedure,
                        header.serial,
                        procedure.name(),
                        serial
                    ),
                });
            }

            return match header.status {
                STATUS_OK => Ok(reply.payload),
                STATUS_ERROR => {
                    let (code, message) = get_error(&reply.payload)?;
                    Err(JugglerError::Rpc {
                        procedure: procedure.name(),
                        code,
                        message,
                    })
                }
                other => Err(JugglerError::Protocol {
                    message: format!("unexpected status {} for {}", other, procedure.name()),
                }),
            };
        }
    }

    fn domain_args(domain: &Domain) -> XdrWriter {
        let mut args = XdrWriter::new();
        put_domain(&mut args, domain);
        args
    }
}

#[async_trait]
impl Hypervisor for LibvirtClient {
    async fn version(&self) -> Result<u64> {
        let reply = self
            .call(Procedure::ConnectGetLibVersion, Vec::new())
            .await?;
        XdrReader::new(&reply).get_u64()
    }

    async fn list_domains(&self) -> Result<Vec<Domain>> {
        let mut args = XdrWriter::new();
        args.put_i32(1)
            .put_u32(LIST_DOMAINS_ACTIVE | LIST_DOMAINS_INACTIVE);
        let reply = self
            .call(Procedure::ConnectListAllDomains, args.into_bytes())
            .await?;

        let mut reader = XdrReader::new(&reply);
        let count = reader.get_u32()? as usize;
        let mut domains = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            domains.push(get_domain(&mut reader)?);
        }
        Ok(domains)
    }

    async fn lookup_domain(&self, name: &str) -> Result<Domain> {
        let mut args = XdrWriter::new();
        args.put_string(name);
        let reply = self
            .call(Procedure::DomainLookupByName, args.into_bytes())
            .await?;
        get_domain(&mut XdrReader::new(&reply))
    }

    async fn domain_config(&self, domain: &Domain) -> Result<String> {
        let mut args = Self::domain_args(domain);
        args.put_u32(0);
        let reply = self
            .call(Procedure::DomainGetXmlDesc, args.into_bytes())
            .await?;
        XdrReader::new(&reply).get_string()
    }

    async fn attach_device(&self, domain: &Domain, device_xml: &str) -> Result<()> {
        let mut args = Self::domain_args(domain);
        args.put_string(device_xml);
        self.call(Procedure::DomainAttachDevice, args.into_bytes())
            .await
            .map(|_| ())
    }

    async fn detach_device(&self, domain: &Domain, device_xml: &str) -> Result<()> {
        let mut args = Self::domain_args(domain);
        args.put_string(device_xml);
        self.call(Procedure::DomainDetachDevice, args.into_bytes())
            .await
            .map(|_| ())
    }

    async fn disconnect(&self) -> Result<()> {
        self.call(Procedure::ConnectClose, Vec::new()).await?;
        let mut stream = self.stream.lock().await;
        stream.shutdown().await.map_err(JugglerError::IoError)?;
        tracing::debug!("Disconnected from libvirt at {}", self.endpoint);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::net::UnixListener;
    use uuid::Uuid;

    const GPU: &str = "<hostdev mode='subsystem' type='pci'><source><address bus='0x01'/></source></hostdev>";

    fn domains() -> Vec<Domain> {
        vec![
            Domain::new(1, "win10", Uuid::from_u128(0x1111)),
            Domain::new(-1, "backup", Uuid::from_u128(0x2222)),
        ]
    }

    /// Answers calls the way libvirtd would, until the client closes.
    async fn serve(listener: UnixListener) -> Vec<Procedure> {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut seen = Vec::new();

        loop {
            let call = match Message::read_from(&mut stream).await {
                Ok(call) => call,
                Err(_) => break,
            };
            let procedure = Procedure::from_i32(call.header.procedure).unwrap();
            seen.push(procedure);
            let mut args = XdrReader::new(&call.payload);
            let mut reply = XdrWriter::new();
            let mut status = STATUS_OK;

            match procedure {
                Procedure::ConnectOpen => {
                    assert_eq!(args.get_opt_string().unwrap().as_deref(), Some("qemu:///system"));
                }
                Procedure::ConnectGetLibVersion => {
                    reply.put_u64(10_002_000);
                }
                Procedure::ConnectListAllDomains => {
                    assert_eq!(args.get_i32().unwrap(), 1);
                    assert_eq!(args.get_u32().unwrap(), 3);
                    reply.put_u32(2);
                    for domain in domains() {
                        put_domain(&mut reply, &domain);
                    }
                    reply.put_u32(2);
                }
                Procedure::DomainGetXmlDesc => {
                    let domain = get_domain(&mut args).unwrap();
                    reply.put_string(&format!(
                        "<domain><name>{}</name><devices>{}</devices></domain>",
                        domain.name, GPU
                    ));
                }
                Procedure::DomainAttachDevice => {
                    let domain = get_domain(&mut args).unwrap();
                    assert_eq!(args.get_string().unwrap(), GPU);
                    if domain.name == "backup" {
                        status = STATUS_ERROR;
                        protocol::put_error(&mut reply, 55, "Requested operation is not valid: domain is not running");
                    }
                }
                Procedure::DomainLookupByName => {
                    let name = args.get_string().unwrap();
                    match domains().into_iter().find(|d| d.name == name) {
                        Some(domain) => put_domain(&mut reply, &domain),
                        None => {
                            status = STATUS_ERROR;
                            protocol::put_error(&mut reply, 42, "Domain not found");
                        }
                    }
                }
                Procedure::DomainDetachDevice => {}
                Procedure::ConnectClose => {}
            }

            Message::new(call.header.reply_to(status), reply.into_bytes())
                .write_to(&mut stream)
                .await
                .unwrap();
            if procedure == Procedure::ConnectClose {
                break;
            }
        }
        seen
    }

    fn settings(dir: &TempDir) -> ConnectionSettings {
        ConnectionSettings {
            socket: dir.path().join("libvirt-sock"),
            uri: "qemu:///system".to_string(),
            connect_timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn test_round_trip_against_fake_daemon() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        let server = tokio::spawn(serve(UnixListener::bind(&settings.socket).unwrap()));

        let client = LibvirtClient::connect(&settings).await.unwrap();
        let listed = client.list_domains().await.unwrap();
        assert_eq!(listed, domains());

        let xml = client.domain_config(&listed[0]).await.unwrap();
        assert!(xml.contains("<name>win10</name>"));

        client.attach_device(&listed[0], GPU).await.unwrap();
        let err = client.attach_device(&listed[1], GPU).await.unwrap_err();
        match &err {
            JugglerError::Rpc { procedure, code, message } => {
                assert_eq!(*procedure, "DOMAIN_ATTACH_DEVICE");
                assert_eq!(*code, 55);
                assert!(message.contains("not running"));
            }
            other => panic!("expected Rpc error, got {:?}", other),
        }
        assert!(err.is_daemon_rejection());

        let found = client.lookup_domain("win10").await.unwrap();
        assert_eq!(found.uuid, Uuid::from_u128(0x1111));
        assert!(client.lookup_domain("nope").await.is_err());

        client.disconnect().await.unwrap();
        let seen = server.await.unwrap();
        assert_eq!(seen.first(), Some(&Procedure::ConnectOpen));
        assert_eq!(seen.get(1), Some(&Procedure::ConnectGetLibVersion));
        assert_eq!(seen.last(), Some(&Procedure::ConnectClose));
    }

    #[tokio::test]
    async fn test_missing_socket_is_a_connection_error() {
        let dir = TempDir::new().unwrap();
        let result = LibvirtClient::connect(&settings(&dir)).await;
        assert!(matches!(result, Err(JugglerError::Connection { .. })));
    }

    #[tokio::test]
    async fn test_daemon_hanging_up_is_not_a_rejection() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        let listener = UnixListener::bind(&settings.socket).unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let result = LibvirtClient::connect(&settings).await;
        server.await.unwrap();
        match result {
            Err(JugglerError::Connection { message, .. }) => {
                assert!(message.contains("closed") || message.contains("failed"), "{}", message)
            }
            other => panic!("expected Connection error, got {:?}", other.map(|_| ())),
        }
    }
}
