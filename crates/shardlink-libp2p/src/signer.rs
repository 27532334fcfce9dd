//! Payload signing and verification with libp2p identity keys.

use libp2p::identity::{self, PublicKey};
use libp2p::PeerId;
use shardlink_core::{MessageVerifier, P2pError};

/// Signs with the host identity and verifies signatures attributed to any
/// peer whose public key is inlined in its peer id.
pub struct P2pSigner {
    keypair: identity::Keypair,
}

impl P2pSigner {
    pub fn new(keypair: identity::Keypair) -> Self {
        Self { keypair }
    }

    /// Sign a payload with the host key.
    pub fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, P2pError> {
        self.keypair
            .sign(payload)
            .map_err(|e| P2pError::InvalidPrivateKey(e.to_string()))
    }

    /// Sign a payload with an ad-hoc secp256k1 private key.
    pub fn sign_using_private_key(
        &self,
        sk_bytes: &[u8],
        payload: &[u8],
    ) -> Result<Vec<u8>, P2pError> {
        let keypair = keypair_from_secp256k1_bytes(sk_bytes)?;
        keypair
            .sign(payload)
            .map_err(|e| P2pError::InvalidPrivateKey(e.to_string()))
    }
}

impl MessageVerifier for P2pSigner {
    fn verify(&self, payload: &[u8], peer: &PeerId, signature: &[u8]) -> Result<(), P2pError> {
        let public_key = extract_public_key(peer)?;
        if public_key.verify(payload, signature) {
            Ok(())
        } else {
            Err(P2pError::InvalidSignature {
                peer: peer.to_base58(),
            })
        }
    }
}

/// Parse raw secp256k1 private-key bytes into a libp2p keypair.
pub fn keypair_from_secp256k1_bytes(sk_bytes: &[u8]) -> Result<identity::Keypair, P2pError> {
    let mut bytes = sk_bytes.to_vec();
    let secret = identity::secp256k1::SecretKey::try_from_bytes(&mut bytes)
        .map_err(|e| P2pError::InvalidPrivateKey(e.to_string()))?;
    Ok(identity::Keypair::from(identity::secp256k1::Keypair::from(
        secret,
    )))
}

/// Recover a public key from a peer id.
///
/// Works only for peer ids that inline the key (identity multihash), which
/// covers ed25519 and compressed secp256k1 identities.
fn extract_public_key(peer: &PeerId) -> Result<PublicKey, P2pError> {
    const IDENTITY_MULTIHASH_CODE: u64 = 0x00;

    let multihash: multihash::Multihash<64> = (*peer).into();
    if multihash.code() != IDENTITY_MULTIHASH_CODE {
        return Err(P2pError::KeyExtractionFailed {
            peer: peer.to_base58(),
        });
    }

    PublicKey::try_decode_protobuf(multihash.digest()).map_err(|_| P2pError::KeyExtractionFailed {
        peer: peer.to_base58(),
    })
}
