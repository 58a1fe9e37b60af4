use crate::modem::commands::CommandState;
use crate::modem::parsers::{parse_cmgs_result, parse_cmgw_result, parse_cpms_capabilities};
use crate::modem::types::{
    ConcatenationHeader, IncomingPduMessage, ModemIncomingMessage, ModemRequest, ModemResponse,
    ModemStatus, PartialDeliveryReport, UnsolicitedMessageKind,
};
use crate::modem::worker::WorkerEvent;
use anyhow::{anyhow, bail, Context, Result};
use sms_pdu::pdu::{DeliverPdu, StatusReportPdu};
use tokio::sync::mpsc;
use tracing::log::{debug, warn};

/// Invoked early by receivers to handle an edge case where certain carriers
/// respond to automated test numbers using an alphanumeric sender ID
/// instead of a numeric one.
fn get_real_number(phone_number: String) -> String {
    match phone_number.as_str() {
        "ASDAmobile" => "2732".to_string(),
        _ => phone_number,
    }
}

/// Guarantee the terminator is always present at compile-time.
macro_rules! at_cmd {
    ($cmd:expr) => {
        concat!($cmd, "\r\n").as_bytes()
    };
    ($fmt:expr, $($arg:tt)*) => {{
        format!(concat!($fmt, "\r\n"), $($arg)*)
    }};
}

pub struct ModemEventHandlers {
    worker_event_tx: mpsc::UnboundedSender<WorkerEvent>,
}
impl ModemEventHandlers {
    pub fn new(worker_event_tx: mpsc::UnboundedSender<WorkerEvent>) -> Self {
        Self { worker_event_tx }
    }

    pub async fn command_sender(&self, request: &ModemRequest) -> Result<CommandState> {
        match request {
            ModemRequest::SendSMS { len, .. } => {
                let command = at_cmd!("AT+CMGS={}", len);
                self.write(command.as_bytes()).await?;
                return Ok(CommandState::WaitingForPrompt);
            }
            ModemRequest::WriteSMS { len, .. } => {
                let command = at_cmd!("AT+CMGW={}", len);
                self.write(command.as_bytes()).await?;
                return Ok(CommandState::WaitingForPrompt);
            }
            ModemRequest::SendStored { index } => {
                self.write(at_cmd!("AT+CMSS={}", index).as_bytes()).await?
            }
            ModemRequest::DeleteStored { index } => {
                self.write(at_cmd!("AT+CMGD={}", index).as_bytes()).await?
            }
            ModemRequest::QueryStorageCapabilities => {
                self.write(at_cmd!("AT+CPMS=?")).await?;
            }
        }
        Ok(CommandState::WaitingForData)
    }

    pub async fn prompt_handler(&self, request: &ModemRequest) -> Result<Option<CommandState>> {
        let pdu = match request {
            ModemRequest::SendSMS { pdu, .. } | ModemRequest::WriteSMS { pdu, .. } => pdu,
            _ => return Ok(None),
        };

        // Push CTRL+Z to end of PDU to submit.
        let encoded = pdu.as_bytes();
        let mut buf = Vec::with_capacity(encoded.len() + 1);
        buf.extend_from_slice(encoded);
        buf.push(0x1A);
        self.write(&buf).await?;

        Ok(Some(CommandState::WaitingForOk))
    }

    pub async fn handle_unsolicited_message(
        &self,
        message_kind: &UnsolicitedMessageKind,
        content: &str,
    ) -> Result<Option<ModemIncomingMessage>> {
        debug!("UnsolicitedMessage: {:?} -> {:?}", &message_kind, &content);

        match message_kind {
            UnsolicitedMessageKind::IncomingSMS => {
                let content_hex =
                    hex::decode(content).context("Failed to decode IncomingSMS hex content")?;
                let deliver_pdu =
                    DeliverPdu::try_from(content_hex.as_slice()).map_err(anyhow::Error::msg)?;

                let msg = deliver_pdu
                    .get_message_data()
                    .decode_message()
                    .map_err(anyhow::Error::msg)?;

                // Find the concatenation component (IEI 0x00) in the UDH, if present.
                let user_data_header = msg
                    .udh
                    .and_then(|udh| udh.components.into_iter().find(|c| c.id == 0x00))
                    .map(|component| parse_concatenation_header(&component.data))
                    .transpose()?;

                let incoming = IncomingPduMessage {
                    phone_number: get_real_number(deliver_pdu.originating_address.to_string()),
                    smsc: deliver_pdu.sca.map(|sca| sca.to_string()),
                    timestamp: Some(deliver_pdu.scts.to_string()),
                    content: Some(msg.text),
                    data: None,
                    user_data_header,
                    delivery_report_request: deliver_pdu.first_octet.srr,
                };
                Ok(Some(ModemIncomingMessage::IncomingSMS(incoming)))
            }
            UnsolicitedMessageKind::DeliveryReport => {
                let content_hex = hex::decode(content).map_err(anyhow::Error::msg)?;
                let status_report_pdu = StatusReportPdu::try_from(content_hex.as_slice())
                    .map_err(anyhow::Error::msg)?;

                let report = PartialDeliveryReport {
                    status: status_report_pdu.status as u8,
                    phone_number: get_real_number(status_report_pdu.recipient_address.to_string()),
                    reference_id: status_report_pdu.message_reference,
                };
                Ok(Some(ModemIncomingMessage::DeliveryReport(report)))
            }
            UnsolicitedMessageKind::ShuttingDown => {
                warn!("The modem is shutting down!");
                self.set_status(ModemStatus::ShuttingDown).await?;
                Ok(None)
            }
        }
    }

    pub async fn command_responder(
        &self,
        request: &ModemRequest,
        response: &String,
    ) -> Result<ModemResponse> {
        debug!("Command response: {request:?} -> {response:?}");
        if !response.trim_end().ends_with("OK") {
            bail!("Modem response does not end with OK");
        }

        match request {
            ModemRequest::SendSMS { .. } => {
                Ok(ModemResponse::SendResult(parse_cmgs_result(response)?))
            }
            ModemRequest::WriteSMS { .. } => {
                Ok(ModemResponse::StoreResult(parse_cmgw_result(response)?))
            }
            ModemRequest::SendStored { .. } => {
                Ok(ModemResponse::SendResult(parse_cmgs_result(response).unwrap_or(0)))
            }
            ModemRequest::DeleteStored { .. } => Ok(ModemResponse::Ok),
            ModemRequest::QueryStorageCapabilities => Ok(ModemResponse::StorageCapabilities(
                parse_cpms_capabilities(response)?,
            )),
        }
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        self.worker_event_tx
            .send(WorkerEvent::WriteCommand(data.to_vec()))
            .context("Failed to send write command event")
    }

    async fn set_status(&self, status: ModemStatus) -> Result<()> {
        self.worker_event_tx
            .send(WorkerEvent::SetStatus(status))
            .context("Failed to send status change event")
    }
}

/// Decodes the 3-byte IEI 0x00 concatenation element (reference, total, sequence).
fn parse_concatenation_header(data: &[u8]) -> Result<ConcatenationHeader> {
    match data {
        [reference, total, index] => Ok(ConcatenationHeader {
            reference: *reference,
            total: *total,
            index: *index,
        }),
        _ => Err(anyhow!(
            "Malformed concatenation UDH element, expected 3 bytes got {}",
            data.len()
        )),
    }
}
