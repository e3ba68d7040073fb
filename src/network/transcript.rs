//! Byte-exact wire encoding of every protocol message.
//!
//! Each frame is a 4-byte big-endian length (covering the tag and body),
//! a one-byte tag, then the body. Points and scalars use the curve's
//! canonical fixed-width form (32 bytes on the Edwards side, 96 bytes for
//! BDN public keys), addresses are length-prefixed UTF-8, arrays are a
//! 4-byte big-endian count followed by the elements.

use blstrs::G2Projective;
use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;

use crate::crypto::proofs::{ShareAndProof, VerifiableCiphertext};
use crate::errors::DkgError;
use crate::network::messages::*;
use crate::suite::{EdwardsSuite, PairingSuite};

pub const TAG_START: u8 = 0x01;
pub const TAG_START_DONE: u8 = 0x02;
pub const TAG_DEAL: u8 = 0x03;
pub const TAG_RESPONSE: u8 = 0x04;
pub const TAG_RESHARE: u8 = 0x05;
pub const TAG_START_RESHARING: u8 = 0x06;
pub const TAG_DECRYPT_REQUEST: u8 = 0x10;
pub const TAG_DECRYPT_REPLY: u8 = 0x11;
pub const TAG_VERIFIABLE_DECRYPT_REQUEST: u8 = 0x12;
pub const TAG_VERIFIABLE_DECRYPT_REPLY: u8 = 0x13;
pub const TAG_SIGN_REQUEST: u8 = 0x20;
pub const TAG_SIGN_RESPONSE: u8 = 0x21;

/// Append-only byte writer used for frames and sealed payloads.
#[derive(Default)]
pub(crate) struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_bool(&mut self, value: bool) {
        self.buf.push(value as u8);
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.put_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_point(&mut self, point: &EdwardsPoint) {
        self.buf.extend_from_slice(&point.compress().to_bytes());
    }

    pub fn put_scalar(&mut self, scalar: &Scalar) {
        self.buf.extend_from_slice(&scalar.to_bytes());
    }

    pub fn put_g2(&mut self, point: &G2Projective) {
        self.buf.extend_from_slice(&PairingSuite.g2_to_bytes(point));
    }

    pub fn put_address(&mut self, address: &Address) {
        self.put_bytes(address.as_str().as_bytes());
    }

    pub fn put_point_vec(&mut self, points: &[EdwardsPoint]) {
        self.put_u32(points.len() as u32);
        for point in points {
            self.put_point(point);
        }
    }
}

/// Cursor-based reader matching [`Writer`].
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DkgError> {
        if self.pos + len > self.buf.len() {
            return Err(DkgError::Protocol("truncated message".into()));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn done(&self) -> Result<(), DkgError> {
        if self.pos != self.buf.len() {
            return Err(DkgError::Protocol("trailing bytes in message".into()));
        }
        Ok(())
    }

    pub fn get_u8(&mut self) -> Result<u8, DkgError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u32(&mut self) -> Result<u32, DkgError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().expect("length checked");
        Ok(u32::from_be_bytes(bytes))
    }

    pub fn get_bool(&mut self) -> Result<bool, DkgError> {
        match self.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DkgError::Protocol(format!("invalid boolean byte {other}"))),
        }
    }

    pub fn get_bytes(&mut self) -> Result<Vec<u8>, DkgError> {
        let len = self.get_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn get_point(&mut self) -> Result<EdwardsPoint, DkgError> {
        EdwardsSuite.point_from_bytes(self.take(32)?)
    }

    pub fn get_scalar(&mut self) -> Result<Scalar, DkgError> {
        EdwardsSuite.scalar_from_bytes(self.take(32)?)
    }

    pub fn get_g2(&mut self) -> Result<G2Projective, DkgError> {
        PairingSuite.g2_from_bytes(self.take(96)?)
    }

    pub fn get_address(&mut self) -> Result<Address, DkgError> {
        let bytes = self.get_bytes()?;
        let inner = String::from_utf8(bytes)
            .map_err(|_| DkgError::Protocol("address is not valid UTF-8".into()))?;
        Ok(Address(inner))
    }

    pub fn get_point_vec(&mut self) -> Result<Vec<EdwardsPoint>, DkgError> {
        let len = self.get_u32()? as usize;
        let mut points = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            points.push(self.get_point()?);
        }
        Ok(points)
    }
}

/// Encode a message into a length-prefixed frame.
pub fn encode(message: &ProtocolMessage) -> Vec<u8> {
    let mut w = Writer::new();
    match message {
        ProtocolMessage::Start(m) => {
            w.put_u8(TAG_START);
            w.put_u32(m.threshold);
            w.put_u32(m.addresses.len() as u32);
            for address in &m.addresses {
                w.put_address(address);
            }
            w.put_point_vec(&m.dkg_pubkeys);
            w.put_u32(m.bdn_pubkeys.len() as u32);
            for key in &m.bdn_pubkeys {
                w.put_g2(key);
            }
        }
        ProtocolMessage::StartDone(m) => {
            w.put_u8(TAG_START_DONE);
            w.put_point(&m.public_key);
        }
        ProtocolMessage::Deal(m) => {
            w.put_u8(TAG_DEAL);
            put_deal(&mut w, m);
        }
        ProtocolMessage::Response(m) => {
            w.put_u8(TAG_RESPONSE);
            w.put_u32(m.index);
            w.put_u32(m.inner.index);
            w.put_bool(m.inner.status);
            w.put_bytes(&m.inner.session_id);
            w.put_bytes(&m.inner.signature);
        }
        ProtocolMessage::Reshare(m) => {
            w.put_u8(TAG_RESHARE);
            put_deal(&mut w, &m.deal);
            w.put_point_vec(&m.public_coeffs);
        }
        ProtocolMessage::StartResharing(m) => {
            w.put_u8(TAG_START_RESHARING);
            w.put_u32(m.threshold_new);
            w.put_u32(m.threshold_old);
            w.put_u32(m.addrs_new.len() as u32);
            for address in &m.addrs_new {
                w.put_address(address);
            }
            w.put_u32(m.addrs_old.len() as u32);
            for address in &m.addrs_old {
                w.put_address(address);
            }
            w.put_point_vec(&m.pubkeys_new);
            w.put_point_vec(&m.pubkeys_old);
        }
        ProtocolMessage::DecryptRequest(m) => {
            w.put_u8(TAG_DECRYPT_REQUEST);
            w.put_point(&m.k);
            w.put_point(&m.c);
        }
        ProtocolMessage::DecryptReply(m) => {
            w.put_u8(TAG_DECRYPT_REPLY);
            w.put_u32(m.i);
            w.put_point(&m.v);
        }
        ProtocolMessage::VerifiableDecryptRequest(m) => {
            w.put_u8(TAG_VERIFIABLE_DECRYPT_REQUEST);
            w.put_u32(m.ciphertexts.len() as u32);
            for ct in &m.ciphertexts {
                put_ciphertext(&mut w, ct);
            }
        }
        ProtocolMessage::VerifiableDecryptReply(m) => {
            w.put_u8(TAG_VERIFIABLE_DECRYPT_REPLY);
            w.put_u32(m.shares.len() as u32);
            for share in &m.shares {
                put_share_and_proof(&mut w, share);
            }
        }
        ProtocolMessage::SignRequest(m) => {
            w.put_u8(TAG_SIGN_REQUEST);
            w.put_bytes(&m.message);
            w.put_u32(m.index);
        }
        ProtocolMessage::SignResponse(m) => {
            w.put_u8(TAG_SIGN_RESPONSE);
            w.put_bytes(&m.signature);
            w.put_u32(m.index);
            w.put_g2(&m.pubkey);
        }
    }

    let body = w.finish();
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    frame
}

/// Decode one length-prefixed frame.
pub fn decode(frame: &[u8]) -> Result<ProtocolMessage, DkgError> {
    if frame.len() < 5 {
        return Err(DkgError::Protocol("frame too short".into()));
    }
    let declared = u32::from_be_bytes(frame[..4].try_into().expect("length checked")) as usize;
    if declared != frame.len() - 4 {
        return Err(DkgError::Protocol(format!(
            "frame length mismatch: declared {declared}, got {}",
            frame.len() - 4
        )));
    }

    let mut r = Reader::new(&frame[4..]);
    let tag = r.get_u8()?;
    let message = match tag {
        TAG_START => {
            let threshold = r.get_u32()?;
            let addr_count = r.get_u32()? as usize;
            let mut addresses = Vec::with_capacity(addr_count.min(1024));
            for _ in 0..addr_count {
                addresses.push(r.get_address()?);
            }
            let dkg_pubkeys = r.get_point_vec()?;
            let bdn_count = r.get_u32()? as usize;
            let mut bdn_pubkeys = Vec::with_capacity(bdn_count.min(1024));
            for _ in 0..bdn_count {
                bdn_pubkeys.push(r.get_g2()?);
            }
            ProtocolMessage::Start(Start {
                threshold,
                addresses,
                dkg_pubkeys,
                bdn_pubkeys,
            })
        }
        TAG_START_DONE => ProtocolMessage::StartDone(StartDone {
            public_key: r.get_point()?,
        }),
        TAG_DEAL => ProtocolMessage::Deal(get_deal(&mut r)?),
        TAG_RESPONSE => ProtocolMessage::Response(Response {
            index: r.get_u32()?,
            inner: DealerResponse {
                index: r.get_u32()?,
                status: r.get_bool()?,
                session_id: r.get_bytes()?,
                signature: r.get_bytes()?,
            },
        }),
        TAG_RESHARE => ProtocolMessage::Reshare(Reshare {
            deal: get_deal(&mut r)?,
            public_coeffs: r.get_point_vec()?,
        }),
        TAG_START_RESHARING => {
            let threshold_new = r.get_u32()?;
            let threshold_old = r.get_u32()?;
            let new_count = r.get_u32()? as usize;
            let mut addrs_new = Vec::with_capacity(new_count.min(1024));
            for _ in 0..new_count {
                addrs_new.push(r.get_address()?);
            }
            let old_count = r.get_u32()? as usize;
            let mut addrs_old = Vec::with_capacity(old_count.min(1024));
            for _ in 0..old_count {
                addrs_old.push(r.get_address()?);
            }
            ProtocolMessage::StartResharing(StartResharing {
                threshold_new,
                threshold_old,
                addrs_new,
                addrs_old,
                pubkeys_new: r.get_point_vec()?,
                pubkeys_old: r.get_point_vec()?,
            })
        }
        TAG_DECRYPT_REQUEST => ProtocolMessage::DecryptRequest(DecryptRequest {
            k: r.get_point()?,
            c: r.get_point()?,
        }),
        TAG_DECRYPT_REPLY => ProtocolMessage::DecryptReply(DecryptReply {
            i: r.get_u32()?,
            v: r.get_point()?,
        }),
        TAG_VERIFIABLE_DECRYPT_REQUEST => {
            let count = r.get_u32()? as usize;
            let mut ciphertexts = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                ciphertexts.push(get_ciphertext(&mut r)?);
            }
            ProtocolMessage::VerifiableDecryptRequest(VerifiableDecryptRequest { ciphertexts })
        }
        TAG_VERIFIABLE_DECRYPT_REPLY => {
            let count = r.get_u32()? as usize;
            let mut shares = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                shares.push(get_share_and_proof(&mut r)?);
            }
            ProtocolMessage::VerifiableDecryptReply(VerifiableDecryptReply { shares })
        }
        TAG_SIGN_REQUEST => ProtocolMessage::SignRequest(SignRequest {
            message: r.get_bytes()?,
            index: r.get_u32()?,
        }),
        TAG_SIGN_RESPONSE => ProtocolMessage::SignResponse(SignResponse {
            signature: r.get_bytes()?,
            index: r.get_u32()?,
            pubkey: r.get_g2()?,
        }),
        other => {
            return Err(DkgError::Protocol(format!("unknown message tag {other:#04x}")));
        }
    };

    r.done()?;
    Ok(message)
}

fn put_deal(w: &mut Writer, deal: &Deal) {
    w.put_u32(deal.index);
    w.put_bytes(&deal.signature);
    w.put_bytes(&deal.encrypted_deal.dh_key);
    w.put_bytes(&deal.encrypted_deal.signature);
    w.put_bytes(&deal.encrypted_deal.nonce);
    w.put_bytes(&deal.encrypted_deal.cipher);
}

fn get_deal(r: &mut Reader<'_>) -> Result<Deal, DkgError> {
    Ok(Deal {
        index: r.get_u32()?,
        signature: r.get_bytes()?,
        encrypted_deal: EncryptedDeal {
            dh_key: r.get_bytes()?,
            signature: r.get_bytes()?,
            nonce: r.get_bytes()?,
            cipher: r.get_bytes()?,
        },
    })
}

fn put_ciphertext(w: &mut Writer, ct: &VerifiableCiphertext) {
    w.put_point(&ct.k);
    w.put_point(&ct.c);
    w.put_point(&ct.ubar);
    w.put_scalar(&ct.e);
    w.put_scalar(&ct.f);
    w.put_point(&ct.gbar);
}

fn get_ciphertext(r: &mut Reader<'_>) -> Result<VerifiableCiphertext, DkgError> {
    Ok(VerifiableCiphertext {
        k: r.get_point()?,
        c: r.get_point()?,
        ubar: r.get_point()?,
        e: r.get_scalar()?,
        f: r.get_scalar()?,
        gbar: r.get_point()?,
    })
}

fn put_share_and_proof(w: &mut Writer, share: &ShareAndProof) {
    w.put_point(&share.v);
    w.put_u32(share.i);
    w.put_point(&share.ui);
    w.put_scalar(&share.ei);
    w.put_scalar(&share.fi);
    w.put_point(&share.hi);
}

fn get_share_and_proof(r: &mut Reader<'_>) -> Result<ShareAndProof, DkgError> {
    Ok(ShareAndProof {
        v: r.get_point()?,
        i: r.get_u32()?,
        ui: r.get_point()?,
        ei: r.get_scalar()?,
        fi: r.get_scalar()?,
        hi: r.get_point()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::bdn::BdnKeyPair;
    use crate::suite::{EdwardsSuite, PairingSuite};
    use rand::rngs::OsRng;

    fn roundtrip(message: ProtocolMessage) -> ProtocolMessage {
        decode(&encode(&message)).unwrap()
    }

    fn sample_point() -> EdwardsPoint {
        EdwardsSuite.base_mul(&EdwardsSuite.random_scalar(&mut OsRng))
    }

    fn sample_deal() -> Deal {
        Deal {
            index: 2,
            signature: vec![0xAA; 64],
            encrypted_deal: EncryptedDeal {
                dh_key: vec![1; 32],
                signature: vec![2; 64],
                nonce: vec![3; 12],
                cipher: vec![4; 80],
            },
        }
    }

    #[test]
    fn tags_are_stable() {
        let start = ProtocolMessage::Start(Start {
            threshold: 1,
            addresses: vec![],
            dkg_pubkeys: vec![],
            bdn_pubkeys: vec![],
        });
        assert_eq!(encode(&start)[4], 0x01);

        let request = ProtocolMessage::DecryptRequest(DecryptRequest {
            k: sample_point(),
            c: sample_point(),
        });
        assert_eq!(encode(&request)[4], 0x10);

        let sign = ProtocolMessage::SignRequest(SignRequest {
            message: vec![1, 2, 3],
            index: 0,
        });
        assert_eq!(encode(&sign)[4], 0x20);
    }

    #[test]
    fn frames_are_length_prefixed() {
        let message = ProtocolMessage::StartDone(StartDone {
            public_key: sample_point(),
        });
        let frame = encode(&message);
        let declared = u32::from_be_bytes(frame[..4].try_into().unwrap()) as usize;
        assert_eq!(declared, frame.len() - 4);
    }

    #[test]
    fn start_round_trips() {
        let bdn = BdnKeyPair::generate(&PairingSuite, &mut OsRng);
        let message = ProtocolMessage::Start(Start {
            threshold: 3,
            addresses: vec![Address::new("127.0.0.1:2001"), Address::new("127.0.0.1:2002")],
            dkg_pubkeys: vec![sample_point(), sample_point()],
            bdn_pubkeys: vec![bdn.public, bdn.public],
        });
        assert_eq!(roundtrip(message.clone()), message);
    }

    #[test]
    fn deal_and_response_round_trip() {
        let deal = ProtocolMessage::Deal(sample_deal());
        assert_eq!(roundtrip(deal.clone()), deal);

        let response = ProtocolMessage::Response(Response {
            index: 1,
            inner: DealerResponse {
                index: 0,
                status: false,
                session_id: vec![9; 32],
                signature: vec![7; 64],
            },
        });
        assert_eq!(roundtrip(response.clone()), response);
    }

    #[test]
    fn reshare_and_start_resharing_round_trip() {
        let reshare = ProtocolMessage::Reshare(Reshare {
            deal: sample_deal(),
            public_coeffs: vec![sample_point(), sample_point()],
        });
        assert_eq!(roundtrip(reshare.clone()), reshare);

        let resharing = ProtocolMessage::StartResharing(StartResharing {
            threshold_new: 3,
            threshold_old: 2,
            addrs_new: vec![Address::new("a"), Address::new("b")],
            addrs_old: vec![Address::new("a")],
            pubkeys_new: vec![sample_point(), sample_point()],
            pubkeys_old: vec![sample_point()],
        });
        assert_eq!(roundtrip(resharing.clone()), resharing);
    }

    #[test]
    fn decrypt_messages_round_trip() {
        let request = ProtocolMessage::DecryptRequest(DecryptRequest {
            k: sample_point(),
            c: sample_point(),
        });
        assert_eq!(roundtrip(request.clone()), request);

        let reply = ProtocolMessage::DecryptReply(DecryptReply {
            i: 2,
            v: sample_point(),
        });
        assert_eq!(roundtrip(reply.clone()), reply);
    }

    #[test]
    fn verifiable_decrypt_messages_round_trip() {
        let suite = EdwardsSuite;
        let ct = VerifiableCiphertext {
            k: sample_point(),
            c: sample_point(),
            ubar: sample_point(),
            e: suite.random_scalar(&mut OsRng),
            f: suite.random_scalar(&mut OsRng),
            gbar: sample_point(),
        };
        let request =
            ProtocolMessage::VerifiableDecryptRequest(VerifiableDecryptRequest {
                ciphertexts: vec![ct, ct],
            });
        assert_eq!(roundtrip(request.clone()), request);

        let share = ShareAndProof {
            v: sample_point(),
            i: 1,
            ui: sample_point(),
            ei: suite.random_scalar(&mut OsRng),
            fi: suite.random_scalar(&mut OsRng),
            hi: sample_point(),
        };
        let reply = ProtocolMessage::VerifiableDecryptReply(VerifiableDecryptReply {
            shares: vec![share],
        });
        assert_eq!(roundtrip(reply.clone()), reply);
    }

    #[test]
    fn sign_messages_round_trip() {
        let bdn = BdnKeyPair::generate(&PairingSuite, &mut OsRng);
        let request = ProtocolMessage::SignRequest(SignRequest {
            message: b"idhash:event".to_vec(),
            index: 1,
        });
        assert_eq!(roundtrip(request.clone()), request);

        let response = ProtocolMessage::SignResponse(SignResponse {
            signature: vec![5; 48],
            index: 1,
            pubkey: bdn.public,
        });
        assert_eq!(roundtrip(response.clone()), response);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut frame = encode(&ProtocolMessage::StartDone(StartDone {
            public_key: sample_point(),
        }));
        frame[4] = 0x7F;
        assert!(decode(&frame).is_err());
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let mut frame = encode(&ProtocolMessage::SignRequest(SignRequest {
            message: vec![],
            index: 0,
        }));
        frame[3] ^= 0x01;
        assert!(decode(&frame).is_err());
    }
}
