// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Handle for connected hardware wallets
//!
//! This provides high-level operations returning explicit results, and is
//! generic over [Transport] types. Device challenges raised during an
//! operation are answered via the configured [ChallengeResponder], or
//! automatically for button requests where `auto_button_ack` is set.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, warn};
use rand_core::{OsRng, RngCore};
use zeroize::Zeroize;

use hwlink_proto::{messages::*, Message, MessageType};

use crate::{
    challenge::{ChallengeKind, ChallengeResponder},
    session::{DeviceSession, SessionConfig},
    sign::{SignRequest, SignedTx, TxDataProvider, TxSigner},
    transport::Transport,
    Error,
};

/// Request / response exchange with a device, resolving intermediate
/// challenges
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Send a request and await the final (non-challenge) response.
    ///
    /// Device [Failure]s are returned as [Error::Failure].
    async fn exchange(&self, req: Message) -> Result<Message, Error>;
}

/// Handle for a hardware wallet over transport `T`
pub struct DeviceHandle<T: Transport> {
    session: DeviceSession<T>,
    responder: Option<Arc<dyn ChallengeResponder>>,
}

impl<T: Transport> Clone for DeviceHandle<T> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            responder: self.responder.clone(),
        }
    }
}

/// Create a [DeviceHandle] wrapper from a type implementing [Transport]
impl<T: Transport> From<T> for DeviceHandle<T> {
    fn from(t: T) -> Self {
        Self::new(t, SessionConfig::default())
    }
}

/// Create a [DeviceHandle] wrapper for an existing [DeviceSession]
impl<T: Transport> From<DeviceSession<T>> for DeviceHandle<T> {
    fn from(session: DeviceSession<T>) -> Self {
        Self {
            session,
            responder: None,
        }
    }
}

impl<T: Transport> DeviceHandle<T> {
    /// Create a handle with the provided session configuration
    pub fn new(t: T, cfg: SessionConfig) -> Self {
        Self::from(DeviceSession::new(t, cfg))
    }

    /// Set the responder used to answer device challenges
    pub fn with_responder(mut self, r: impl ChallengeResponder + 'static) -> Self {
        self.responder = Some(Arc::new(r));
        self
    }

    /// Fetch the underlying session
    pub fn session(&self) -> &DeviceSession<T> {
        &self.session
    }

    fn cfg(&self) -> &SessionConfig {
        self.session.config()
    }

    /// Helper to fetch user interaction timeout
    fn user_timeout(&self) -> Duration {
        self.cfg().user_timeout()
    }

    /// Helper to fetch request timeout
    fn request_timeout(&self) -> Duration {
        self.cfg().request_timeout()
    }

    /// Attach and connect to the device
    pub async fn open(&self) -> Result<(), Error> {
        if !self.session.attach().await? {
            return Err(Error::NoDevice);
        }
        self.session.connect().await
    }

    /// Disconnect from the device
    pub async fn close(&self) -> Result<(), Error> {
        self.session.disconnect().await
    }

    /// Issue a request, resolving challenges until a final response
    async fn call(&self, req: impl Into<Message>, timeout: Duration) -> Result<Message, Error> {
        let mut resp = self.session.request(req, timeout).await?;

        while resp.message_type().is_challenge() {
            let c = self
                .session
                .challenge()
                .await
                .ok_or(Error::NoPendingChallenge)?;

            if c.kind == ChallengeKind::Button && self.cfg().auto_button_ack {
                debug!("Acknowledging button request");
                self.session.answer_challenge(&mut []).await?;
                resp = self.session.recv(self.user_timeout()).await?;
                continue;
            }

            let r = match &self.responder {
                Some(r) => r,
                None => {
                    warn!("No responder for {} challenge", c.kind);
                    self.cancel_pending().await?;
                    return Err(Error::ChallengeUnanswered(c.kind));
                }
            };

            match tokio::time::timeout_at(c.deadline, r.answer(&c)).await {
                Ok(Some(mut secret)) => {
                    let r = self.session.answer_challenge(&mut secret).await;
                    secret.zeroize();
                    r?;
                }
                Ok(None) => {
                    debug!("{} challenge declined", c.kind);
                    self.session.cancel_challenge().await?;
                }
                Err(_) => {
                    self.cancel_pending().await?;
                    return Err(Error::UserTimeout);
                }
            }

            // Device may wait on the user following an acknowledgement
            resp = self.session.recv(self.user_timeout()).await?;
        }

        match resp {
            Message::Failure(f) => {
                debug!("Device failure: {:?}", f);
                Err(f.into())
            }
            m => Ok(m),
        }
    }

    /// Cancel an outstanding challenge, discarding the device response
    async fn cancel_pending(&self) -> Result<(), Error> {
        self.session.cancel_challenge().await?;

        if let Err(e) = self.session.recv(self.request_timeout()).await {
            debug!("No response to cancel: {}", e);
        }

        Ok(())
    }

    /// Issue a request expecting a specific response type
    async fn call_for<R>(&self, req: impl Into<Message>, timeout: Duration) -> Result<R, Error>
    where
        R: TryFrom<Message, Error = Message>,
    {
        let resp = self.call(req, timeout).await?;
        R::try_from(resp).map_err(|m| Error::UnexpectedResponse(m.message_type()))
    }

    /// Issue a request expecting [Success]
    async fn call_success(&self, req: impl Into<Message>, timeout: Duration) -> Result<(), Error> {
        let _: Success = self.call_for(req, timeout).await?;
        Ok(())
    }

    /// Initialize the device session, returning device features
    pub async fn initialize(&self) -> Result<Features, Error> {
        debug!("Initializing device");

        self.call_for(Initialize {}, self.request_timeout()).await
    }

    /// Fetch device features
    pub async fn features(&self) -> Result<Features, Error> {
        self.call_for(GetFeatures {}, self.request_timeout()).await
    }

    /// Ping the device, returning the echoed message
    pub async fn ping(&self, message: &str, button_protection: bool) -> Result<String, Error> {
        let req = Ping {
            message: Some(message.to_string()),
            button_protection: Some(button_protection),
            ..Default::default()
        };

        let resp: Success = self.call_for(req, self.request_timeout()).await?;

        Ok(resp.message().to_string())
    }

    /// Fetch the public key for a derivation path
    pub async fn get_public_key(
        &self,
        address_n: &[u32],
        curve: Option<&str>,
    ) -> Result<PublicKey, Error> {
        debug!("Requesting public key for path: {:?}", address_n);

        let req = GetPublicKey {
            address_n: address_n.to_vec(),
            ecdsa_curve_name: curve.map(|c| c.to_string()),
            show_display: None,
        };

        self.call_for(req, self.request_timeout()).await
    }

    /// Fetch the address for a derivation path, optionally showing it on
    /// the device for confirmation
    pub async fn get_address(
        &self,
        coin_name: Option<&str>,
        address_n: &[u32],
        show_display: bool,
    ) -> Result<String, Error> {
        debug!("Requesting address for path: {:?}", address_n);

        let req = GetAddress {
            address_n: address_n.to_vec(),
            coin_name: coin_name.map(|c| c.to_string()),
            show_display: Some(show_display),
        };

        let resp: Address = self.call_for(req, self.request_timeout()).await?;

        Ok(resp.address)
    }

    /// Fetch random data from the device
    pub async fn get_entropy(&self, size: u32) -> Result<Vec<u8>, Error> {
        let resp: Entropy = self
            .call_for(GetEntropy { size }, self.request_timeout())
            .await?;

        Ok(resp.entropy)
    }

    /// Sign a message with the key at the provided path
    pub async fn sign_message(
        &self,
        coin_name: Option<&str>,
        address_n: &[u32],
        message: &[u8],
    ) -> Result<MessageSignature, Error> {
        let req = SignMessage {
            address_n: address_n.to_vec(),
            message: message.to_vec(),
            coin_name: coin_name.map(|c| c.to_string()),
        };

        self.call_for(req, self.user_timeout()).await
    }

    /// Verify a message signature on the device
    pub async fn verify_message(
        &self,
        address: &str,
        signature: &[u8],
        message: &[u8],
    ) -> Result<(), Error> {
        let req = VerifyMessage {
            address: Some(address.to_string()),
            signature: Some(signature.to_vec()),
            message: Some(message.to_vec()),
        };

        self.call_success(req, self.user_timeout()).await
    }

    /// Execute an identity challenge and response (SLIP-0013)
    pub async fn sign_identity(
        &self,
        identity: IdentityType,
        challenge_hidden: &[u8],
        challenge_visual: &str,
        curve: Option<&str>,
    ) -> Result<SignedIdentity, Error> {
        debug!("Signing identity: {}", identity.uri());

        let req = SignIdentity {
            identity: Some(identity),
            challenge_hidden: Some(challenge_hidden.to_vec()),
            challenge_visual: Some(challenge_visual.to_string()),
            ecdsa_curve_name: curve.map(|c| c.to_string()),
        };

        self.call_for(req, self.user_timeout()).await
    }

    /// Encrypt or decrypt a value with a key derived on the device
    pub async fn cipher_key_value(&self, req: CipherKeyValue) -> Result<Vec<u8>, Error> {
        let resp: CipheredKeyValue = self.call_for(req, self.user_timeout()).await?;

        Ok(resp.value.unwrap_or_default())
    }

    /// Encrypt a message to the provided public key
    pub async fn encrypt_message(&self, req: EncryptMessage) -> Result<EncryptedMessage, Error> {
        self.call_for(req, self.user_timeout()).await
    }

    /// Decrypt a message with the key at the provided path
    pub async fn decrypt_message(&self, req: DecryptMessage) -> Result<DecryptedMessage, Error> {
        self.call_for(req, self.user_timeout()).await
    }

    /// Estimate the serialized size of a transaction
    pub async fn estimate_tx_size(
        &self,
        coin_name: Option<&str>,
        inputs_count: u32,
        outputs_count: u32,
    ) -> Result<u32, Error> {
        let req = EstimateTxSize {
            outputs_count,
            inputs_count,
            coin_name: coin_name.map(|c| c.to_string()),
        };

        let resp: TxSize = self.call_for(req, self.request_timeout()).await?;

        Ok(resp.tx_size())
    }

    /// Clear cached session data (PIN, passphrase) on the device
    pub async fn clear_session(&self) -> Result<(), Error> {
        self.call_success(ClearSession {}, self.request_timeout())
            .await
    }

    /// Set, change or remove the device PIN
    pub async fn change_pin(&self, remove: bool) -> Result<(), Error> {
        self.call_success(
            ChangePin {
                remove: Some(remove),
            },
            self.user_timeout(),
        )
        .await
    }

    /// Wipe the device
    pub async fn wipe_device(&self) -> Result<(), Error> {
        debug!("Wiping device");

        self.call_success(WipeDevice {}, self.user_timeout()).await
    }

    /// Initialise the device with a new seed, mixing host entropy when
    /// requested
    pub async fn reset_device(&self, req: ResetDevice) -> Result<(), Error> {
        debug!("Resetting device");

        let mut resp = self.call(req, self.user_timeout()).await?;

        if resp.message_type() == MessageType::EntropyRequest {
            let mut entropy = vec![0u8; 32];
            OsRng.fill_bytes(&mut entropy);

            let mut ack = EntropyAck {
                entropy: Some(entropy),
            };
            let r = self.call(ack.clone(), self.user_timeout()).await;
            ack.entropy.zeroize();

            resp = r?;
        }

        match resp {
            Message::Success(_) => Ok(()),
            m => Err(Error::UnexpectedResponse(m.message_type())),
        }
    }

    /// Recover the device from a seed entered word by word
    pub async fn recover_device(&self, req: RecoveryDevice) -> Result<(), Error> {
        debug!("Recovering device");

        self.call_success(req, self.user_timeout()).await
    }

    /// Load a seed onto the device (debug firmware only)
    pub async fn load_device(&self, mut req: LoadDevice) -> Result<(), Error> {
        let r = self.call_success(req.clone(), self.user_timeout()).await;
        req.zeroize();
        r
    }

    /// Apply device settings
    pub async fn apply_settings(&self, req: ApplySettings) -> Result<(), Error> {
        self.call_success(req, self.user_timeout()).await
    }

    /// Cancel the current device operation
    pub async fn cancel(&self) -> Result<(), Error> {
        match self.call(Cancel {}, self.request_timeout()).await {
            Ok(_) => Ok(()),
            Err(Error::Failure {
                code: FailureType::ActionCancelled,
                ..
            }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Sign a transaction, components are fetched from the provider as
    /// requested by the device
    pub async fn sign_tx(
        &self,
        req: impl Into<SignRequest>,
        provider: &dyn TxDataProvider,
    ) -> Result<SignedTx, Error> {
        TxSigner::new(self, req).sign(provider).await
    }
}

/// [Exchange] for [DeviceHandle], bounded by the user interaction timeout
#[async_trait]
impl<T: Transport> Exchange for DeviceHandle<T> {
    async fn exchange(&self, req: Message) -> Result<Message, Error> {
        self.call(req, self.user_timeout()).await
    }
}
