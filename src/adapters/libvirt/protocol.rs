//! Framing and payloads of libvirt's remote protocol (`remote_protocol.x`).

use crate::adapters::libvirt::xdr::{XdrReader, XdrWriter};
use crate::domain::model::Domain;
use crate::utils::error::{JugglerError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

pub const REMOTE_PROGRAM: u32 = 0x2000_8086;
pub const REMOTE_PROTOCOL_VERSION: u32 = 1;

/// Length word plus six header words.
pub const FRAME_OVERHEAD: usize = 4 + 6 * 4;
pub const MAX_MESSAGE_LEN: usize = 32 * 1024 * 1024;

pub const TYPE_CALL: i32 = 0;
pub const TYPE_REPLY: i32 = 1;

pub const STATUS_OK: i32 = 0;
pub const STATUS_ERROR: i32 = 1;

pub const LIST_DOMAINS_ACTIVE: u32 = 1;
pub const LIST_DOMAINS_INACTIVE: u32 = 2;

const UUID_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Procedure {
    ConnectOpen = 1,
    ConnectClose = 2,
    DomainAttachDevice = 8,
    DomainDetachDevice = 13,
    DomainGetXmlDesc = 14,
    DomainLookupByName = 23,
    ConnectGetLibVersion = 157,
    ConnectListAllDomains = 273,
}

impl Procedure {
    pub fn name(self) -> &'static str {
        match self {
            Procedure::ConnectOpen => "CONNECT_OPEN",
            Procedure::ConnectClose => "CONNECT_CLOSE",
            Procedure::DomainAttachDevice => "DOMAIN_ATTACH_DEVICE",
            Procedure::DomainDetachDevice => "DOMAIN_DETACH_DEVICE",
            Procedure::DomainGetXmlDesc => "DOMAIN_GET_XML_DESC",
            Procedure::DomainLookupByName => "DOMAIN_LOOKUP_BY_NAME",
            Procedure::ConnectGetLibVersion => "CONNECT_GET_LIB_VERSION",
            Procedure::ConnectListAllDomains => "CONNECT_LIST_ALL_DOMAINS",
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        [
            Procedure::ConnectOpen,
            Procedure::ConnectClose,
            Procedure::DomainAttachDevice,
            Procedure::DomainDetachDevice,
            Procedure::DomainGetXmlDesc,
            Procedure::DomainLookupByName,
            Procedure::ConnectGetLibVersion,
            Procedure::ConnectListAllDomains,
        ]
        .into_iter()
        .find(|p| *p as i32 == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub program: u32,
    pub version: u32,
    pub procedure: i32,
    pub kind: i32,
    pub serial: u32,
    pub status: i32,
}

impl Header {
    pub fn call(procedure: Procedure, serial: u32) -> Self {
        Self {
            program: REMOTE_PROGRAM,
            version: REMOTE_PROTOCOL_VERSION,
            procedure: procedure as i32,
            kind: TYPE_CALL,
            serial,
            status: STATUS_OK,
        }
    }

    pub fn reply_to(&self, status: i32) -> Self {
        Self {
            kind: TYPE_REPLY,
            status,
            ..*self
        }
    }

    fn encode(&self, writer: &mut XdrWriter) {
        writer
            .put_u32(self.program)
            .put_u32(self.version)
            .put_i32(self.procedure)
            .put_i32(self.kind)
            .put_u32(self.serial)
            .put_i32(self.status);
    }

    fn decode(reader: &mut XdrReader<'_>) -> Result<Self> {
        Ok(Self {
            program: reader.get_u32()?,
            version: reader.get_u32()?,
            procedure: reader.get_i32()?,
            kind: reader.get_i32()?,
            serial: reader.get_u32()?,
            status: reader.get_i32()?,
        })
    }
}

/// One decoded frame: header plus the raw XDR payload after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(header: Header, payload: Vec<u8>) -> Self {
        Self { header, payload }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut writer = XdrWriter::new();
        writer.put_u32((FRAME_OVERHEAD + self.payload.len()) as u32);
        self.header.encode(&mut writer);
        let mut frame = writer.into_bytes();
        frame.extend_from_slice(&self.payload);
        frame
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<()> {
        writer
            .write_all(&self.encode())
            .await
            .map_err(|e| transport("write", e))?;
        writer.flush().await.map_err(|e| transport("flush", e))
    }

    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self> {
        let mut len = [0u8; 4];
        reader
            .read_exact(&mut len)
            .await
            .map_err(|e| transport("read", e))?;
        let len = u32::from_be_bytes(len) as usize;
        if !(FRAME_OVERHEAD..=MAX_MESSAGE_LEN).contains(&len) {
            return Err(JugglerError::Protocol {
                message: format!("invalid frame length {}", len),
            });
        }

        let mut body = vec![0u8; len - 4];
        reader
            .read_exact(&mut body)
            .await
            .map_err(|e| transport("read", e))?;

        let mut body_reader = XdrReader::new(&body);
        let header = Header::decode(&mut body_reader)?;
        let payload = body_reader.remaining().to_vec();
        Ok(Self { header, payload })
    }
}

fn transport(action: &str, error: std::io::Error) -> JugglerError {
    if error.kind() == std::io::ErrorKind::UnexpectedEof {
        JugglerError::Protocol {
            message: "connection closed by daemon".to_string(),
        }
    } else {
        JugglerError::Protocol {
            message: format!("{} failed: {}", action, error),
        }
    }
}

/// `remote_nonnull_domain`.
pub fn put_domain(writer: &mut XdrWriter, domain: &Domain) {
    writer
        .put_string(&domain.name)
        .put_fixed_opaque(domain.uuid.as_bytes())
        .put_i32(domain.id);
}

pub fn get_domain(reader: &mut XdrReader<'_>) -> Result<Domain> {
    let name = reader.get_string()?;
    let uuid = Uuid::from_slice(reader.get_fixed_opaque(UUID_LEN)?).map_err(|e| {
        JugglerError::Protocol {
            message: format!("bad uuid for domain {}: {}", name, e),
        }
    })?;
    let id = reader.get_i32()?;
    Ok(Domain { id, name, uuid })
}

/// Code and message of a `remote_error` payload. The remaining fields are
/// not needed and not read.
pub fn get_error(payload: &[u8]) -> Result<(i32, String)> {
    let mut reader = XdrReader::new(payload);
    let code = reader.get_i32()?;
    let _domain = reader.get_i32()?;
    let message = reader
        .get_opt_string()?
        .unwrap_or_else(|| "unknown libvirt error".to_string());
    Ok((code, message))
}

/// Builds a `remote_error` payload with only the fields [`get_error`] reads
/// filled in meaningfully.
pub fn put_error(writer: &mut XdrWriter, code: i32, message: &str) {
    writer
        .put_i32(code)
        .put_i32(0)
        .put_opt_string(Some(message))
        .put_i32(2)
        .put_bool(false)
        .put_opt_string(None)
        .put_opt_string(None)
        .put_opt_string(None)
        .put_i32(0)
        .put_i32(0)
        .put_bool(false);
}

/// Renders libvirt's packed version number, e.g. `10002000` as `10.2.0`.
pub fn format_version(version: u64) -> String {
    format!(
        "{}.{}.{}",
        version / 1_000_000,
        version / 1_000 % 1_000,
        version % 1_000
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_length_covers_header_and_payload() {
        let message = Message::new(Header::call(Procedure::ConnectGetLibVersion, 7), vec![1, 2, 3, 4]);
        let frame = message.encode();
        assert_eq!(frame.len(), FRAME_OVERHEAD + 4);
        assert_eq!(&frame[..4], &(frame.len() as u32).to_be_bytes());
        assert_eq!(&frame[4..8], &REMOTE_PROGRAM.to_be_bytes());

        let mut cursor = std::io::Cursor::new(frame);
        let decoded = Message::read_from(&mut cursor).await.unwrap();
        assert_eq!(decoded, message);
    }

    #[tokio::test]
    async fn test_rejects_oversized_frame() {
        let mut cursor = std::io::Cursor::new(u32::MAX.to_be_bytes().to_vec());
        assert!(matches!(
            Message::read_from(&mut cursor).await,
            Err(JugglerError::Protocol { .. })
        ));
    }

    #[test]
    fn test_error_payload() {
        let mut writer = XdrWriter::new();
        put_error(&mut writer, 42, "Domain not found");
        assert_eq!(
            get_error(&writer.into_bytes()).unwrap(),
            (42, "Domain not found".to_string())
        );
    }

    #[test]
    fn test_format_version() {
        assert_eq!(format_version(10_002_000), "10.2.0");
        assert_eq!(format_version(6_000_011), "6.0.11");
    }

    #[test]
    fn test_procedure_numbers() {
        assert_eq!(Procedure::from_i32(273), Some(Procedure::ConnectListAllDomains));
        assert_eq!(Procedure::from_i32(9999), None);
    }
}
