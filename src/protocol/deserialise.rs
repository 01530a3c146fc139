//! Deserialisation of DNS messages from the network.  See the `types`
//! module for details of the format.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::protocol::types::*;

impl Message {
    /// # Errors
    ///
    /// If the message cannot be parsed.
    pub fn from_octets(octets: &[u8]) -> Result<Self, Error> {
        Self::deserialise(&mut ConsumableBuffer::new(octets))
    }

    /// # Errors
    ///
    /// If the message cannot be parsed.
    pub fn deserialise(buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let wire_header = WireHeader::deserialise(buffer)?;
        let id = wire_header.header.id;
        let mut questions = Vec::with_capacity(wire_header.qdcount.into());
        let mut answers = Vec::with_capacity(wire_header.ancount.into());
        let mut authority = Vec::with_capacity(wire_header.nscount.into());
        let mut additional = Vec::with_capacity(wire_header.arcount.into());

        for _ in 0..wire_header.qdcount {
            questions.push(Question::deserialise(id, buffer)?);
        }
        for _ in 0..wire_header.ancount {
            answers.push(Record::deserialise(id, buffer)?);
        }
        for _ in 0..wire_header.nscount {
            authority.push(Record::deserialise(id, buffer)?);
        }
        for _ in 0..wire_header.arcount {
            additional.push(Record::deserialise(id, buffer)?);
        }

        let mut message = Self {
            header: wire_header.header,
            questions,
            answers,
            authority,
            additional,
        };

        // the upper eight bits of an extended rcode travel in the OPT
        // record: widen the header's four-bit value.
        if let Some(extended) = message.edns().map(|edns| edns.extended_rcode) {
            let low = u16::from(message.header.rcode) & 0x000f;
            message.header.rcode = Rcode::from((u16::from(extended) << 4) | low);
        }

        Ok(message)
    }
}

impl WireHeader {
    /// # Errors
    ///
    /// If the header is too short.
    pub fn deserialise(buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let id = buffer.next_u16().ok_or(Error::CompletelyBusted)?;
        let flags1 = buffer.next_u8().ok_or(Error::UnexpectedEnd(id))?;
        let flags2 = buffer.next_u8().ok_or(Error::UnexpectedEnd(id))?;
        let qdcount = buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?;
        let ancount = buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?;
        let nscount = buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?;
        let arcount = buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?;

        Ok(Self {
            header: Header {
                id,
                is_response: flags1 & HEADER_MASK_QR != 0,
                opcode: Opcode::from((flags1 & HEADER_MASK_OPCODE) >> HEADER_OFFSET_OPCODE),
                is_authoritative: flags1 & HEADER_MASK_AA != 0,
                is_truncated: flags1 & HEADER_MASK_TC != 0,
                recursion_desired: flags1 & HEADER_MASK_RD != 0,
                recursion_available: flags2 & HEADER_MASK_RA != 0,
                authentic_data: flags2 & HEADER_MASK_AD != 0,
                checking_disabled: flags2 & HEADER_MASK_CD != 0,
                rcode: Rcode::from(u16::from(flags2 & HEADER_MASK_RCODE)),
            },
            qdcount,
            ancount,
            nscount,
            arcount,
        })
    }
}

impl Question {
    /// # Errors
    ///
    /// If the question cannot be parsed.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let name = DomainName::deserialise(id, buffer)?;
        let qtype = QueryType::from(buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?);
        let qclass = QueryClass::from(buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?);

        if qclass.is_unknown() {
            return Err(Error::UnknownClass(id));
        }

        Ok(Self {
            name,
            qtype,
            qclass,
        })
    }
}

impl Record {
    /// # Errors
    ///
    /// If the record cannot be parsed.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let name = DomainName::deserialise(id, buffer)?;
        let rtype = buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?;

        if rtype == OPT_RR_TYPE {
            if !name.is_root() {
                return Err(Error::MalformedEdns(id));
            }
            Edns::deserialise(id, buffer).map(Record::Pseudo)
        } else {
            ResourceRecord::deserialise(id, name, RecordType::from(rtype), buffer)
                .map(Record::Standard)
        }
    }
}

impl ResourceRecord {
    /// Parse the fields after the owner name and type, which have
    /// already been consumed.
    ///
    /// # Errors
    ///
    /// If the record cannot be parsed.
    pub fn deserialise(
        id: u16,
        name: DomainName,
        rtype: RecordType,
        buffer: &mut ConsumableBuffer,
    ) -> Result<Self, Error> {
        let rclass = RecordClass::from(buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?);
        if rclass.is_unknown() {
            return Err(Error::UnknownClass(id));
        }

        let ttl = buffer.next_u32().ok_or(Error::UnexpectedEnd(id))?;
        let rdlength = buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?;

        let rdata_start = buffer.position();

        // only (IN, type) combinations have a typed representation;
        // everything else keeps its raw octets.  records which include
        // domain names are deserialised against the whole message so
        // compression pointers expand.
        let rtype_with_data = if rclass == RecordClass::IN {
            match rtype {
                RecordType::A => RecordTypeWithData::A {
                    address: Ipv4Addr::from(buffer.next_u32().ok_or(Error::UnexpectedEnd(id))?),
                },
                RecordType::AAAA => RecordTypeWithData::AAAA {
                    address: Ipv6Addr::new(
                        buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?,
                        buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?,
                        buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?,
                        buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?,
                        buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?,
                        buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?,
                        buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?,
                        buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?,
                    ),
                },
                RecordType::NS => RecordTypeWithData::NS {
                    nsdname: DomainName::deserialise(id, buffer)?,
                },
                RecordType::CNAME => RecordTypeWithData::CNAME {
                    cname: DomainName::deserialise(id, buffer)?,
                },
                RecordType::PTR => RecordTypeWithData::PTR {
                    ptrdname: DomainName::deserialise(id, buffer)?,
                },
                RecordType::MX => RecordTypeWithData::MX {
                    preference: buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?,
                    exchange: DomainName::deserialise(id, buffer)?,
                },
                RecordType::SRV => RecordTypeWithData::SRV {
                    priority: buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?,
                    weight: buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?,
                    port: buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?,
                    target: DomainName::deserialise(id, buffer)?,
                },
                RecordType::SOA => RecordTypeWithData::SOA {
                    mname: DomainName::deserialise(id, buffer)?,
                    rname: DomainName::deserialise(id, buffer)?,
                    serial: buffer.next_u32().ok_or(Error::UnexpectedEnd(id))?,
                    refresh: buffer.next_u32().ok_or(Error::UnexpectedEnd(id))?,
                    retry: buffer.next_u32().ok_or(Error::UnexpectedEnd(id))?,
                    expire: buffer.next_u32().ok_or(Error::UnexpectedEnd(id))?,
                    minimum: buffer.next_u32().ok_or(Error::UnexpectedEnd(id))?,
                },
                RecordType::TXT => RecordTypeWithData::TXT {
                    strings: txt_strings(id, rdlength, buffer)?,
                },
                RecordType::DS => {
                    if rdlength < 4 {
                        return Err(Error::BadRdata(id));
                    }
                    RecordTypeWithData::DS {
                        key_tag: buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?,
                        algorithm: buffer.next_u8().ok_or(Error::UnexpectedEnd(id))?,
                        digest_type: buffer.next_u8().ok_or(Error::UnexpectedEnd(id))?,
                        digest: raw_rdata(id, rdlength - 4, buffer)?,
                    }
                }
                _ => RecordTypeWithData::Unknown {
                    rtype,
                    octets: raw_rdata(id, rdlength, buffer)?,
                },
            }
        } else {
            RecordTypeWithData::Unknown {
                rtype,
                octets: raw_rdata(id, rdlength, buffer)?,
            }
        };

        if buffer.position() == rdata_start + rdlength as usize {
            Ok(Self {
                name,
                rtype_with_data,
                rclass,
                ttl,
            })
        } else {
            Err(Error::BadRdata(id))
        }
    }
}

fn raw_rdata(id: u16, rdlength: u16, buffer: &mut ConsumableBuffer) -> Result<Vec<u8>, Error> {
    if let Some(octets) = buffer.take(rdlength as usize) {
        Ok(octets.to_vec())
    } else {
        Err(Error::UnexpectedEnd(id))
    }
}

/// TXT RDATA is one or more length-prefixed character-strings packed
/// into the RDLENGTH octets.
fn txt_strings(
    id: u16,
    rdlength: u16,
    buffer: &mut ConsumableBuffer,
) -> Result<Vec<Vec<u8>>, Error> {
    let end = buffer.position() + rdlength as usize;
    let mut strings = Vec::new();

    while buffer.position() < end {
        let len = buffer.next_u8().ok_or(Error::UnexpectedEnd(id))?;
        let octets = buffer
            .take(len as usize)
            .ok_or(Error::UnexpectedEnd(id))?
            .to_vec();
        strings.push(octets);
    }

    if strings.is_empty() {
        return Err(Error::BadRdata(id));
    }

    Ok(strings)
}

impl Edns {
    /// Parse an OPT pseudo-record, from just after the type field.
    ///
    /// # Errors
    ///
    /// If the record cannot be parsed.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let udp_payload_size = buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?;
        let extended_rcode = buffer.next_u8().ok_or(Error::UnexpectedEnd(id))?;
        let version = buffer.next_u8().ok_or(Error::UnexpectedEnd(id))?;
        let wire_flags = buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?;
        let rdlength = buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?;

        let end = buffer.position() + rdlength as usize;
        let mut options = Vec::new();
        while buffer.position() < end {
            let code = buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?;
            let length = buffer.next_u16().ok_or(Error::UnexpectedEnd(id))?;
            let data = buffer
                .take(length as usize)
                .ok_or(Error::UnexpectedEnd(id))?
                .to_vec();
            options.push(EdnsOption { code, data });
        }

        if buffer.position() != end {
            return Err(Error::MalformedEdns(id));
        }

        Ok(Self {
            udp_payload_size,
            extended_rcode,
            version,
            dnssec_ok: wire_flags & 0x8000 != 0,
            flags: wire_flags & 0x7fff,
            options,
        })
    }
}

impl DomainName {
    /// Read a domain name, expanding compression pointers against the
    /// whole message.  The caller's buffer is left positioned just
    /// after the name as it appears in the stream: immediately after
    /// the first pointer if there was one, or after the terminating
    /// zero label otherwise.
    ///
    /// # Errors
    ///
    /// If the domain cannot be parsed.
    #[allow(clippy::missing_panics_doc)]
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let mut labels = Vec::<Label>::with_capacity(5);
        let mut len = 0;
        let mut followed = Vec::<usize>::new();
        let mut cursor = buffer.fork();

        loop {
            let size = cursor.next_u8().ok_or(Error::UnexpectedEnd(id))?;

            if usize::from(size) <= LABEL_MAX_LEN {
                len += 1 + usize::from(size);

                if size == 0 {
                    labels.push(Label::new());
                    break;
                }

                if let Some(octets) = cursor.take(size as usize) {
                    // safe because of the bounds check above
                    labels.push(Label::try_from(octets).unwrap());
                } else {
                    return Err(Error::UnexpectedEnd(id));
                }

                if len > DOMAINNAME_MAX_LEN {
                    return Err(Error::NameTooLong(id));
                }
            } else if size & 0b1100_0000 == 0b1100_0000 {
                let hi = size & 0b0011_1111;
                let lo = cursor.next_u8().ok_or(Error::UnexpectedEnd(id))?;
                let target = usize::from(u16::from_be_bytes([hi, lo]));

                if followed.is_empty() {
                    // the stream resumes after the first pointer, no
                    // matter how far the expansion wanders
                    buffer.seek(cursor.position());
                }

                if target >= cursor.len() {
                    return Err(Error::InvalidPointer(id));
                }
                if followed.contains(&target) {
                    return Err(Error::PointerCycle(id));
                }

                followed.push(target);
                cursor = cursor.at_offset(target);
            } else {
                // the 01 and 10 prefixes are reserved
                return Err(Error::MalformedName(id));
            }
        }

        if len > DOMAINNAME_MAX_LEN {
            return Err(Error::NameTooLong(id));
        }

        if followed.is_empty() {
            buffer.seek(cursor.position());
        }

        Ok(DomainName { labels, len })
    }
}

/// Errors encountered when parsing a message.  In all the errors
/// which have a `u16` parameter, that is the ID from the header - so
/// that an error response can be sent.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    /// The message is not even 2 octets long, so it doesn't contain a
    /// valid ID.  An error cannot even be sent back to the client in
    /// this case as, without an ID, it cannot be linked with the
    /// correct query.
    CompletelyBusted,

    /// The buffer ended part-way through a field.
    UnexpectedEnd(u16),

    /// A label octet uses one of the reserved prefixes (01 or 10).
    MalformedName(u16),

    /// A domain is over 255 octets in size.
    NameTooLong(u16),

    /// A compression pointer points at or past the end of the
    /// message.
    InvalidPointer(u16),

    /// Compression pointers visit the same offset twice.
    PointerCycle(u16),

    /// A class this implementation does not know.
    UnknownClass(u16),

    /// RDATA which does not match its stated length or its type's
    /// shape.
    BadRdata(u16),

    /// An OPT record with a non-empty owner name, or with malformed
    /// options.
    MalformedEdns(u16),
}

impl Error {
    pub fn id(self) -> Option<u16> {
        match self {
            Error::CompletelyBusted => None,
            Error::UnexpectedEnd(id) => Some(id),
            Error::MalformedName(id) => Some(id),
            Error::NameTooLong(id) => Some(id),
            Error::InvalidPointer(id) => Some(id),
            Error::PointerCycle(id) => Some(id),
            Error::UnknownClass(id) => Some(id),
            Error::BadRdata(id) => Some(id),
            Error::MalformedEdns(id) => Some(id),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::CompletelyBusted => write!(f, "message too short to contain an ID"),
            Error::UnexpectedEnd(_) => write!(f, "message ends part-way through a field"),
            Error::MalformedName(_) => write!(f, "label uses a reserved prefix"),
            Error::NameTooLong(_) => write!(f, "domain name over 255 octets"),
            Error::InvalidPointer(_) => write!(f, "compression pointer out of bounds"),
            Error::PointerCycle(_) => write!(f, "compression pointers form a cycle"),
            Error::UnknownClass(_) => write!(f, "unknown class"),
            Error::BadRdata(_) => write!(f, "RDATA does not match its stated length"),
            Error::MalformedEdns(_) => write!(f, "malformed OPT record"),
        }
    }
}

impl std::error::Error for Error {}

/// A buffer which will be consumed by the parsing process.
pub struct ConsumableBuffer<'a> {
    octets: &'a [u8],
    position: usize,
}

impl<'a> ConsumableBuffer<'a> {
    pub fn new(octets: &'a [u8]) -> Self {
        Self {
            octets,
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.octets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.octets.is_empty()
    }

    pub fn next_u8(&mut self) -> Option<u8> {
        if self.octets.len() > self.position {
            let a = self.octets[self.position];
            self.position += 1;
            Some(a)
        } else {
            None
        }
    }

    pub fn next_u16(&mut self) -> Option<u16> {
        if self.octets.len() > self.position + 1 {
            let a = self.octets[self.position];
            let b = self.octets[self.position + 1];
            self.position += 2;
            Some(u16::from_be_bytes([a, b]))
        } else {
            None
        }
    }

    pub fn next_u32(&mut self) -> Option<u32> {
        if self.octets.len() > self.position + 3 {
            let a = self.octets[self.position];
            let b = self.octets[self.position + 1];
            let c = self.octets[self.position + 2];
            let d = self.octets[self.position + 3];
            self.position += 4;
            Some(u32::from_be_bytes([a, b, c, d]))
        } else {
            None
        }
    }

    pub fn take(&mut self, size: usize) -> Option<&'a [u8]> {
        if self.octets.len() >= self.position + size {
            let slice = &self.octets[self.position..self.position + size];
            self.position += size;
            Some(slice)
        } else {
            None
        }
    }

    pub fn at_offset(&self, position: usize) -> ConsumableBuffer<'a> {
        Self {
            octets: self.octets,
            position,
        }
    }

    pub fn fork(&self) -> ConsumableBuffer<'a> {
        self.at_offset(self.position)
    }

    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }
}
