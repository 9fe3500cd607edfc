use crate::error::Result;
use crate::keypath::Keypath;
use crate::messages::{
    CardanoScriptConfig, CardanoSignTransactionRequest, CardanoSignTransactionResponse,
    CardanoTransaction,
};
use crate::session::Session;
use crate::types::CardanoNetwork;
use log::{debug, info};

impl Session {
    /// Get one 64 byte extended public key (key followed by chain code) per keypath.
    pub async fn cardano_xpubs(&self, keypaths: &[Keypath]) -> Result<Vec<Vec<u8>>> {
        debug!("Getting {} Cardano xpubs", keypaths.len());
        Ok(self.adapter()?.cardano_xpubs(keypaths).await?)
    }

    pub async fn cardano_address(
        &self,
        network: CardanoNetwork,
        script_config: &CardanoScriptConfig,
        display: bool,
    ) -> Result<String> {
        Ok(self
            .adapter()?
            .cardano_address(network, script_config, display)
            .await?)
    }

    pub async fn cardano_sign_transaction(
        &self,
        transaction: &CardanoTransaction,
    ) -> Result<CardanoSignTransactionResponse> {
        let request = CardanoSignTransactionRequest::from(transaction);
        info!(
            "Signing Cardano transaction with {} inputs and {} outputs",
            request.inputs.len(),
            request.outputs.len()
        );
        Ok(self.adapter()?.cardano_sign_transaction(&request).await?)
    }
}
