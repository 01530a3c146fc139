//! Serialisation of DNS messages to the wire format.  See the `types`
//! module for details of the format.

use bytes::{BufMut, BytesMut};
use std::collections::HashMap;

use crate::protocol::types::*;

impl Message {
    /// # Errors
    ///
    /// If the message is invalid (the `Message` type permits more
    /// states than strictly allowed).
    pub fn to_octets(&self) -> Result<BytesMut, Error> {
        let mut buffer = WritableBuffer::default();
        self.serialise(&mut buffer)?;
        Ok(buffer.octets)
    }

    /// # Errors
    ///
    /// If the message is invalid (the `Message` type permits more
    /// states than strictly allowed).
    pub fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        if self.header.opcode.is_reserved() {
            return Err(Error::UnknownOpcode(u8::from(self.header.opcode)));
        }
        if self.header.rcode.is_reserved() {
            return Err(Error::UnknownRcode(u16::from(self.header.rcode)));
        }

        let qdcount = usize_to_u16(self.questions.len())?;
        let ancount = usize_to_u16(self.answers.len())?;
        let nscount = usize_to_u16(self.authority.len())?;
        let arcount = usize_to_u16(self.additional.len())?;

        // the upper bits of the rcode travel in the OPT record, if
        // the message carries one
        let extended_rcode = (u16::from(self.header.rcode) >> 4) as u8;

        self.header.serialise(buffer);
        buffer.write_u16(qdcount);
        buffer.write_u16(ancount);
        buffer.write_u16(nscount);
        buffer.write_u16(arcount);

        for question in &self.questions {
            question.serialise(buffer);
        }
        for record in &self.answers {
            record.serialise(buffer, extended_rcode)?;
        }
        for record in &self.authority {
            record.serialise(buffer, extended_rcode)?;
        }
        for record in &self.additional {
            record.serialise(buffer, extended_rcode)?;
        }

        Ok(())
    }
}

impl Header {
    pub fn serialise(&self, buffer: &mut WritableBuffer) {
        // octet 1
        let flag_qr = if self.is_response { HEADER_MASK_QR } else { 0 };
        let field_opcode = HEADER_MASK_OPCODE & (u8::from(self.opcode) << HEADER_OFFSET_OPCODE);
        let flag_aa = if self.is_authoritative {
            HEADER_MASK_AA
        } else {
            0
        };
        let flag_tc = if self.is_truncated { HEADER_MASK_TC } else { 0 };
        let flag_rd = if self.recursion_desired {
            HEADER_MASK_RD
        } else {
            0
        };
        // octet 2
        let flag_ra = if self.recursion_available {
            HEADER_MASK_RA
        } else {
            0
        };
        let flag_ad = if self.authentic_data {
            HEADER_MASK_AD
        } else {
            0
        };
        let flag_cd = if self.checking_disabled {
            HEADER_MASK_CD
        } else {
            0
        };
        let field_rcode = HEADER_MASK_RCODE & (u16::from(self.rcode) as u8);

        buffer.write_u16(self.id);
        buffer.write_u8(flag_qr | field_opcode | flag_aa | flag_tc | flag_rd);
        buffer.write_u8(flag_ra | flag_ad | flag_cd | field_rcode);
    }
}

impl Question {
    pub fn serialise(&self, buffer: &mut WritableBuffer) {
        self.name.serialise(buffer, true);
        buffer.write_u16(self.qtype.into());
        buffer.write_u16(self.qclass.into());
    }
}

impl Record {
    /// # Errors
    ///
    /// If the record cannot be expressed on the wire.
    pub fn serialise(&self, buffer: &mut WritableBuffer, extended_rcode: u8) -> Result<(), Error> {
        match self {
            Record::Standard(rr) => rr.serialise(buffer),
            Record::Pseudo(edns) => edns.serialise(buffer, extended_rcode),
        }
    }
}

impl ResourceRecord {
    /// # Errors
    ///
    /// If the record cannot be expressed on the wire.
    pub fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        if self.rclass.is_unknown() {
            return Err(Error::UnknownClass(u16::from(self.rclass)));
        }

        self.name.serialise(buffer, true);
        buffer.write_u16(self.rtype_with_data.rtype().into());
        buffer.write_u16(self.rclass.into());
        buffer.write_u32(self.ttl);

        // filled in below
        let rdlength_index = buffer.index();
        buffer.write_u16(0);

        match &self.rtype_with_data {
            RecordTypeWithData::A { address } => buffer.write_octets(&address.octets()),
            RecordTypeWithData::AAAA { address } => buffer.write_octets(&address.octets()),
            RecordTypeWithData::NS { nsdname } => nsdname.serialise(buffer, true),
            RecordTypeWithData::CNAME { cname } => cname.serialise(buffer, true),
            RecordTypeWithData::PTR { ptrdname } => ptrdname.serialise(buffer, true),
            RecordTypeWithData::MX {
                preference,
                exchange,
            } => {
                buffer.write_u16(*preference);
                exchange.serialise(buffer, true);
            }
            RecordTypeWithData::TXT { strings } => {
                for string in strings {
                    buffer.write_u8(usize_to_u8(string.len())?);
                    buffer.write_octets(string);
                }
            }
            // RFC 2782: the target may not be compressed
            RecordTypeWithData::SRV {
                priority,
                weight,
                port,
                target,
            } => {
                buffer.write_u16(*priority);
                buffer.write_u16(*weight);
                buffer.write_u16(*port);
                target.serialise(buffer, false);
            }
            RecordTypeWithData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                mname.serialise(buffer, true);
                rname.serialise(buffer, true);
                buffer.write_u32(*serial);
                buffer.write_u32(*refresh);
                buffer.write_u32(*retry);
                buffer.write_u32(*expire);
                buffer.write_u32(*minimum);
            }
            RecordTypeWithData::DS {
                key_tag,
                algorithm,
                digest_type,
                digest,
            } => {
                buffer.write_u16(*key_tag);
                buffer.write_u8(*algorithm);
                buffer.write_u8(*digest_type);
                buffer.write_octets(digest);
            }
            RecordTypeWithData::Unknown { rtype, .. } => {
                return Err(Error::UnsupportedType(u16::from(*rtype)));
            }
        };

        // -2 so we don't also include the 2 octets for the rdlength
        let rdlength = usize_to_u16(buffer.index() - rdlength_index - 2)?;
        let [hi, lo] = rdlength.to_be_bytes();
        buffer.octets[rdlength_index] = hi;
        buffer.octets[rdlength_index + 1] = lo;

        Ok(())
    }
}

impl Edns {
    /// Write the OPT pseudo-record.  The extended-RCODE octet comes
    /// from the message's rcode, not from this struct, so the header
    /// stays the single source of truth.
    ///
    /// # Errors
    ///
    /// If an option payload is too long.
    pub fn serialise(&self, buffer: &mut WritableBuffer, extended_rcode: u8) -> Result<(), Error> {
        let mut rdlength = 0usize;
        for option in &self.options {
            rdlength += 4 + option.data.len();
        }

        buffer.write_u8(0); // empty owner name
        buffer.write_u16(OPT_RR_TYPE);
        buffer.write_u16(self.udp_payload_size);
        buffer.write_u8(extended_rcode);
        buffer.write_u8(self.version);
        buffer.write_u16(if self.dnssec_ok { 0x8000 } else { 0 } | (self.flags & 0x7fff));
        buffer.write_u16(usize_to_u16(rdlength)?);

        for option in &self.options {
            buffer.write_u16(option.code);
            buffer.write_u16(usize_to_u16(option.data.len())?);
            buffer.write_octets(&option.data);
        }

        Ok(())
    }
}

impl DomainName {
    /// Write a domain name, using a compression pointer for the
    /// longest suffix of it already written to this message, when
    /// permitted.  Every suffix written literally is remembered for
    /// later names regardless of the `compress` flag.
    pub fn serialise(&self, buffer: &mut WritableBuffer, compress: bool) {
        for i in 0..self.labels.len() {
            let label = &self.labels[i];

            if label.is_empty() {
                buffer.write_u8(0);
                return;
            }

            if compress {
                if let Some(pointer) = buffer.name_pointer(&self.labels[i..]) {
                    buffer.write_u16(pointer);
                    return;
                }
            }

            buffer.memoise_name(&self.labels[i..]);
            buffer.write_u8(label.len());
            buffer.write_octets(label.octets());
        }
    }
}

/// Errors encountered when serialising a message.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    /// A counter does not fit in the desired width.
    CounterTooLarge { counter: usize, bits: u32 },

    /// The opcode is one of the reserved values.
    UnknownOpcode(u8),

    /// The rcode is one of the reserved values.
    UnknownRcode(u16),

    /// The record class is not one this implementation can write.
    UnknownClass(u16),

    /// The RDATA has no typed representation, so the encoder does not
    /// know how to write it.
    UnsupportedType(u16),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::CounterTooLarge { counter, bits } => {
                write!(f, "'{counter}' cannot be converted to a u{bits}")
            }
            Error::UnknownOpcode(n) => write!(f, "cannot encode reserved opcode {n}"),
            Error::UnknownRcode(n) => write!(f, "cannot encode reserved rcode {n}"),
            Error::UnknownClass(n) => write!(f, "cannot encode unknown class {n}"),
            Error::UnsupportedType(n) => write!(f, "cannot encode RDATA for type {n}"),
        }
    }
}

impl std::error::Error for Error {}

/// A buffer which can be written to, for serialisation purposes.
///
/// It keeps a dictionary from label suffix to the offset where that
/// suffix was first written, for name compression.  Records are
/// serialised straight into the message buffer (with RDLENGTH
/// backfilled), so recorded offsets are absolute message offsets.
pub struct WritableBuffer {
    pub octets: BytesMut,
    name_pointers: HashMap<Vec<Label>, u16>,
}

impl Default for WritableBuffer {
    fn default() -> Self {
        Self {
            octets: BytesMut::with_capacity(512),
            name_pointers: HashMap::new(),
        }
    }
}

impl WritableBuffer {
    pub fn index(&self) -> usize {
        self.octets.len()
    }

    /// Remember the suffix starting at the current offset, if it is
    /// new and the offset fits in the 14 bits a pointer has.
    pub fn memoise_name(&mut self, labels: &[Label]) {
        // a bare root label is cheaper written literally
        if labels.len() <= 1 || self.name_pointers.contains_key(labels) {
            return;
        }

        if let Ok(index) = u16::try_from(self.index()) {
            if index <= 0b0011_1111_1111_1111 {
                let [hi, lo] = index.to_be_bytes();
                self.name_pointers
                    .insert(labels.to_vec(), u16::from_be_bytes([hi | 0b1100_0000, lo]));
            }
        }
    }

    pub fn name_pointer(&self, labels: &[Label]) -> Option<u16> {
        self.name_pointers.get(labels).copied()
    }

    pub fn write_u8(&mut self, octet: u8) {
        self.octets.put_u8(octet);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_octets(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_octets(&value.to_be_bytes());
    }

    pub fn write_octets(&mut self, octets: &[u8]) {
        self.octets.put_slice(octets);
    }
}

/// Helper function to convert a `usize` into a `u16` (or return an
/// error).
///
/// # Errors
///
/// If the value cannot be converted.
fn usize_to_u16(counter: usize) -> Result<u16, Error> {
    if let Ok(t) = u16::try_from(counter) {
        Ok(t)
    } else {
        Err(Error::CounterTooLarge {
            counter,
            bits: u16::BITS,
        })
    }
}

/// Like `usize_to_u16`, but for character-string lengths.
///
/// # Errors
///
/// If the value cannot be converted.
fn usize_to_u8(counter: usize) -> Result<u8, Error> {
    if let Ok(t) = u8::try_from(counter) {
        Ok(t)
    } else {
        Err(Error::CounterTooLarge {
            counter,
            bits: u8::BITS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::test_util::*;

    #[test]
    #[rustfmt::skip]
    fn test_name_compression_whole_name() {
        let mut buf = WritableBuffer::default();
        buf.write_u8(1);
        buf.write_u8(2);
        buf.write_u8(3);
        buf.write_u8(4);
        domain("www.example.com.").serialise(&mut buf, true);
        domain("www.example.com.").serialise(&mut buf, true);

        assert_eq!(
            vec![
                1, 2, 3, 4,
                // domain 1
                3, 119, 119, 119, // "www"
                7, 101, 120, 97, 109, 112, 108, 101, // "example"
                3, 99, 111, 109, 0, // "com"
                // domain 2
                0b1100_0000, 0b0000_0100 // pointer
            ],
            buf.octets,
        );
    }

    #[test]
    #[rustfmt::skip]
    fn test_name_compression_longest_suffix() {
        let mut buf = WritableBuffer::default();
        buf.write_u8(1);
        buf.write_u8(2);
        buf.write_u8(3);
        buf.write_u8(4);
        domain("www.example.com.").serialise(&mut buf, true);
        domain("mail.example.com.").serialise(&mut buf, true);
        domain("com.").serialise(&mut buf, true);

        assert_eq!(
            vec![
                1, 2, 3, 4,
                // domain 1
                3, 119, 119, 119, // "www"
                7, 101, 120, 97, 109, 112, 108, 101, // "example"
                3, 99, 111, 109, 0, // "com"
                // domain 2: "mail" + pointer to "example.com"
                4, 109, 97, 105, 108,
                0b1100_0000, 0b0000_1000,
                // domain 3: pointer to "com"
                0b1100_0000, 0b0001_0000,
            ],
            buf.octets,
        );
    }

    #[test]
    #[rustfmt::skip]
    fn test_name_compression_opt_out() {
        let mut buf = WritableBuffer::default();
        buf.write_u8(1);
        buf.write_u8(2);
        buf.write_u8(3);
        buf.write_u8(4);
        domain("www.example.com.").serialise(&mut buf, true);
        domain("www.example.com.").serialise(&mut buf, false);

        assert_eq!(
            vec![
                1, 2, 3, 4,
                // domain 1
                3, 119, 119, 119, // "www"
                7, 101, 120, 97, 109, 112, 108, 101, // "example"
                3, 99, 111, 109, 0, // "com"
                // domain 2
                3, 119, 119, 119, // "www"
                7, 101, 120, 97, 109, 112, 108, 101, // "example"
                3, 99, 111, 109, 0, // "com"
            ],
            buf.octets,
        );
    }

    #[test]
    #[rustfmt::skip]
    fn test_sets_rdlength() {
        let mut buf = WritableBuffer::default();
        buf.write_u8(1);
        buf.write_u8(2);
        buf.write_u8(3);
        buf.write_u8(4);

        let rr = ResourceRecord {
            name: domain("www.example.com."),
            rtype_with_data: RecordTypeWithData::MX {
                preference: 32,
                exchange: domain("mx.example.org."),
            },
            rclass: RecordClass::IN,
            ttl: 300,
        };
        let _ = rr.serialise(&mut buf);

        assert_eq!(
            vec![
                1, 2, 3, 4,
                // NAME
                3, 119, 119, 119, // "www"
                7, 101, 120, 97, 109, 112, 108, 101, // "example"
                3, 99, 111, 109, 0, // "com"
                // TYPE
                0b0000_0000, 0b0000_1111, // MX
                // CLASS
                0b0000_0000, 0b0000_0001, // IN
                // TTL
                0b0000_0000, 0b0000_0000, 0b0000_0001, 0b0010_1100, // 300
                // RDLENGTH
                0b0000_0000, 0b0001_0010, // 18 octets
                // RDATA
                0, 32, // preference
                2, 109, 120, // "mx"
                7, 101, 120, 97, 109, 112, 108, 101, // "example"
                3, 111, 114, 103, 0, // "org"
            ],
            buf.octets,
        );
    }

    #[test]
    #[rustfmt::skip]
    fn test_encodes_txt_query() {
        let message = Message::from_question(
            123,
            Question {
                name: domain("example.com"),
                qtype: QueryType::Record(RecordType::TXT),
                qclass: QueryClass::Record(RecordClass::IN),
            },
        );
        let mut message = message;
        message.header.recursion_desired = true;

        assert_eq!(
            vec![
                0x00, 0x7b, // ID 123
                0x01, 0x00, // RD
                0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // counts
                0x07, 0x65, 0x78, 0x61, 0x6d, 0x70, 0x6c, 0x65, // "example"
                0x03, 0x63, 0x6f, 0x6d, 0x00, // "com"
                0x00, 0x10, // QTYPE TXT
                0x00, 0x01, // QCLASS IN
            ],
            message.to_octets().unwrap(),
        );
    }

    #[test]
    #[rustfmt::skip]
    fn test_extended_rcode_splits_across_header_and_opt() {
        let mut message = Message::from_question(
            7,
            Question {
                name: domain("example.com"),
                qtype: QueryType::Record(RecordType::A),
                qclass: QueryClass::Record(RecordClass::IN),
            },
        )
        .make_response();
        message.header.rcode = Rcode::BadVersion;
        message.additional.push(Record::Pseudo(Edns::basic(512)));

        let octets = message.to_octets().unwrap();

        // low nibble of the second flags octet: 16 & 0xf = 0
        assert_eq!(0, octets[3] & 0x0f);

        // the OPT extended-rcode octet: 16 >> 4 = 1.  the OPT record
        // follows the question section (12 header + 17 question), and
        // the extended rcode is its 6th octet.
        assert_eq!(1, octets[12 + 17 + 5]);
    }

    #[test]
    fn test_rejects_reserved_opcode() {
        let mut message = Message::from_question(
            7,
            Question {
                name: domain("example.com"),
                qtype: QueryType::Record(RecordType::A),
                qclass: QueryClass::Record(RecordClass::IN),
            },
        );
        message.header.opcode = Opcode::from(3);

        assert_eq!(Err(Error::UnknownOpcode(3)), message.to_octets().map(|_| ()));
    }

    #[test]
    fn test_rejects_unknown_rdata() {
        let mut buf = WritableBuffer::default();
        let rr = ResourceRecord {
            name: domain("www.example.com."),
            rtype_with_data: RecordTypeWithData::Unknown {
                rtype: RecordType::from(100),
                octets: vec![1, 2, 3],
            },
            rclass: RecordClass::IN,
            ttl: 300,
        };

        assert_eq!(Err(Error::UnsupportedType(100)), rr.serialise(&mut buf));
    }

    #[test]
    fn test_rejects_overlong_txt_string() {
        let mut buf = WritableBuffer::default();
        let rr = ResourceRecord {
            name: domain("www.example.com."),
            rtype_with_data: RecordTypeWithData::TXT {
                strings: vec![vec![b'x'; 256]],
            },
            rclass: RecordClass::IN,
            ttl: 300,
        };

        assert_eq!(
            Err(Error::CounterTooLarge {
                counter: 256,
                bits: 8
            }),
            rr.serialise(&mut buf)
        );
    }

    #[test]
    #[rustfmt::skip]
    fn test_srv_target_is_not_compressed() {
        let mut buf = WritableBuffer::default();
        let rr = ResourceRecord {
            name: domain("_sip._tcp.example.com."),
            rtype_with_data: RecordTypeWithData::SRV {
                priority: 10,
                weight: 60,
                port: 5060,
                target: domain("sip.example.com."),
            },
            rclass: RecordClass::IN,
            ttl: 300,
        };
        rr.serialise(&mut buf).unwrap();

        // "sip.example.com" shares the "example.com" suffix with the
        // owner name, but the target must be written in full
        let tail = &buf.octets[buf.octets.len() - 17..];
        assert_eq!(
            vec![
                3, 115, 105, 112, // "sip"
                7, 101, 120, 97, 109, 112, 108, 101, // "example"
                3, 99, 111, 109, 0, // "com"
            ],
            tail,
        );
    }
}
