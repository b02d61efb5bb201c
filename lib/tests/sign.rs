// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::time::Duration;

use hwlink::{
    proto::{messages::*, Message, MessageType},
    sign::{InputInfo, OutputInfo, OutputScript},
    transport::Script,
    Error, MemoryTxProvider, SessionConfig, SessionState,
};

mod helpers;
use helpers::{event_names, setup};

/// Provider with `n` inputs spending outputs of a single previous transaction
fn provider(n: u32) -> MemoryTxProvider {
    MemoryTxProvider {
        coin_name: Some("Bitcoin".to_string()),
        inputs: (0..n)
            .map(|i| InputInfo {
                address_n: vec![0, i],
                prev_hash: vec![0xaa; 32],
                prev_index: i,
                sequence: None,
            })
            .collect(),
        outputs: vec![OutputInfo {
            address: Some("1MJ2tj2ThBE62zXbBYA5ZaN3fdve5CPAz1".to_string()),
            address_n: vec![],
            amount: 390000,
            script_type: OutputScript::Address,
        }],
        prev_txs: vec![],
    }
}

/// Device request for input `index`, carrying the signature for the previous
/// input where one exists
fn input_request(index: u32) -> TxRequest {
    TxRequest {
        request_type: Some(RequestType::TxInput as i32),
        details: Some(TxRequestDetailsType {
            request_index: Some(index),
            tx_hash: None,
        }),
        serialized: index.checked_sub(1).map(|i| TxRequestSerializedType {
            signature_index: Some(i),
            signature: Some(vec![i as u8; 8]),
            serialized_tx: Some(vec![i as u8]),
        }),
    }
}

fn finished(last: u32) -> TxRequest {
    TxRequest {
        request_type: Some(RequestType::TxFinished as i32),
        details: None,
        serialized: Some(TxRequestSerializedType {
            signature_index: Some(last),
            signature: Some(vec![last as u8; 8]),
            serialized_tx: Some(vec![last as u8]),
        }),
    }
}

#[tokio::test]
async fn sign_inputs_in_order() -> anyhow::Result<()> {
    const N: u32 = 3;

    let mut s = Script::new()
        .expect(MessageType::SignTx)
        .reply(input_request(0));
    for i in 1..N {
        s = s.expect(MessageType::TxAck).reply(input_request(i));
    }
    s = s.expect(MessageType::TxAck).reply(finished(N - 1));

    let (h, ctl, mut events) = setup(s, SessionConfig::default()).await;

    let p = provider(N);
    let signed = h.sign_tx(p.sign_tx(), &p).await?;

    // Fragments are concatenated in the order received
    assert_eq!(signed.serialized_tx, vec![0, 1, 2]);
    assert_eq!(signed.signatures.len(), N as usize);
    assert_eq!(signed.signatures.get(&2), Some(&vec![2u8; 8]));

    // Exactly one ack per request, each carrying the requested input
    let acks: Vec<_> = ctl
        .received()
        .into_iter()
        .filter_map(|m| match m {
            Message::TxAck(a) => a.tx,
            _ => None,
        })
        .collect();
    assert_eq!(acks.len(), N as usize);

    for (i, a) in acks.iter().enumerate() {
        assert_eq!(a.inputs.len(), 1);
        assert_eq!(a.inputs[0].prev_index, i as u32);
        assert!(a.outputs.is_empty());
    }

    let names = event_names(&mut events);
    assert_eq!(
        names.iter().filter(|n| n.as_str() == "TX_REQUEST").count(),
        N as usize + 1
    );

    assert_eq!(h.session().state().await, SessionState::Idle);

    Ok(())
}

#[tokio::test]
async fn sign_outputs_and_prev_tx() -> anyhow::Result<()> {
    let prev_hash = vec![0xaa; 32];

    let p: MemoryTxProvider = serde_json::from_value(serde_json::json!({
        "inputs": [ { "prev_hash": hex::encode(&prev_hash), "prev_index": 0 } ],
        "outputs": [ { "address": "1MJ2tj2ThBE62zXbBYA5ZaN3fdve5CPAz1", "amount": 1000 } ],
        "prev_txs": [ {
            "hash": hex::encode(&prev_hash),
            "version": 2,
            "inputs": [ { "prev_hash": "bb".repeat(32), "prev_index": 3 } ],
            "bin_outputs": [ { "amount": 2000, "script_pubkey": "76a914" } ]
        } ]
    }))?;

    let request = |t: RequestType, index: u32, hash: Option<Vec<u8>>| TxRequest {
        request_type: Some(t as i32),
        details: Some(TxRequestDetailsType {
            request_index: Some(index),
            tx_hash: hash,
        }),
        serialized: None,
    };

    let s = Script::new()
        .expect(MessageType::SignTx)
        .reply(request(RequestType::TxMeta, 0, Some(prev_hash.clone())))
        .expect(MessageType::TxAck)
        .reply(request(RequestType::TxInput, 0, Some(prev_hash.clone())))
        .expect(MessageType::TxAck)
        .reply(request(RequestType::TxOutput, 0, Some(prev_hash.clone())))
        .expect(MessageType::TxAck)
        .reply(request(RequestType::TxOutput, 0, None))
        .expect(MessageType::TxAck)
        .reply(finished(0));

    let (h, ctl, _events) = setup(s, SessionConfig::default()).await;

    h.sign_tx(p.sign_tx(), &p).await?;

    let acks: Vec<_> = ctl
        .received()
        .into_iter()
        .filter_map(|m| match m {
            Message::TxAck(a) => a.tx,
            _ => None,
        })
        .collect();
    assert_eq!(acks.len(), 4);

    // Metadata only
    assert_eq!(acks[0].version, Some(2));
    assert_eq!(acks[0].inputs_cnt, Some(1));
    assert_eq!(acks[0].outputs_cnt, Some(1));
    assert!(acks[0].inputs.is_empty());

    // Previous transaction input
    assert_eq!(acks[1].inputs[0].prev_index, 3);

    // Previous transaction output
    assert_eq!(acks[2].bin_outputs[0].amount, 2000);
    assert_eq!(acks[2].bin_outputs[0].script_pubkey, vec![0x76, 0xa9, 0x14]);

    // Output being signed
    assert_eq!(acks[3].outputs[0].amount, 1000);
    assert_eq!(
        acks[3].outputs[0].script_type(),
        OutputScriptType::PayToAddress
    );

    Ok(())
}

#[tokio::test]
async fn disconnect_during_signing() -> anyhow::Result<()> {
    let s = Script::new()
        .expect(MessageType::SignTx)
        .reply(input_request(0))
        .expect(MessageType::TxAck)
        .reply(input_request(1))
        .expect(MessageType::TxAck)
        .disconnect_after(Duration::from_millis(10));

    let (h, _ctl, mut events) = setup(s, SessionConfig::default()).await;

    let p = provider(3);
    let r = h.sign_tx(p.sign_tx(), &p).await;

    assert!(matches!(r, Err(Error::DisconnectedDuringSigning)));
    assert_eq!(h.session().state().await, SessionState::Disconnected);

    assert_eq!(
        event_names(&mut events).last().map(|n| n.as_str()),
        Some("DEVICE_DISCONNECTED")
    );

    Ok(())
}

#[tokio::test]
async fn missing_component_aborts() -> anyhow::Result<()> {
    let s = Script::new()
        .expect(MessageType::SignTx)
        .reply(input_request(0))
        .expect(MessageType::TxAck)
        .reply(input_request(1));

    let (h, ctl, _events) = setup(s, SessionConfig::default()).await;

    // Provider only holds a single input
    let p = provider(1);
    let r = h.sign_tx(p.sign_tx(), &p).await;

    assert!(matches!(r, Err(Error::SigningAborted(_))));

    // No ack was sent for the missing input, the session remains usable
    assert_eq!(
        ctl.received_types(),
        vec![MessageType::SignTx, MessageType::TxAck]
    );
    assert_eq!(h.session().state().await, SessionState::Idle);

    Ok(())
}

#[tokio::test]
async fn unexpected_response_aborts() -> anyhow::Result<()> {
    let s = Script::new()
        .expect(MessageType::SignTx)
        .reply(Success::default());

    let (h, _ctl, _events) = setup(s, SessionConfig::default()).await;

    let p = provider(1);
    let r = h.sign_tx(p.sign_tx(), &p).await;

    assert!(matches!(r, Err(Error::SigningAborted(_))));

    Ok(())
}

#[tokio::test]
async fn simple_sign() -> anyhow::Result<()> {
    let p = provider(2);

    let s = Script::new()
        .expect(MessageType::SimpleSignTx)
        .reply(finished(1));

    let (h, ctl, _events) = setup(s, SessionConfig::default()).await;

    let signed = h.sign_tx(p.simple_sign_tx(), &p).await?;
    assert_eq!(signed.serialized_tx, vec![1]);

    // All components are sent up front
    match &ctl.received()[0] {
        Message::SimpleSignTx(r) => {
            assert_eq!(r.inputs.len(), 2);
            assert_eq!(r.outputs.len(), 1);
            assert_eq!(r.coin_name(), "Bitcoin");
        }
        m => panic!("unexpected message: {m:?}"),
    }

    Ok(())
}
