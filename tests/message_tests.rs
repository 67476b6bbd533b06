use base64::Engine;
use aria_voice::transport::{AudioChunkMessage, Command, ControlMessage, DataReference};

#[test]
fn control_command_uses_the_wire_names() {
    let msg = ControlMessage::new(Command::StartListeningSpeech {
        conversation_id: "conv-42".to_string(),
    });

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"command\":\"START_LISTENING_SPEECH\""));
    assert!(json.contains("\"conversation_id\":\"conv-42\""));
    assert!(json.contains("message_id"));
    assert!(json.contains("timestamp"));

    let parsed: ControlMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.command, msg.command);
    assert_eq!(parsed.conversation_id(), Some("conv-42"));
}

#[test]
fn shutdown_command_has_no_payload() {
    let msg = ControlMessage::new(Command::AgentShutdown);
    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"command\":\"AGENT_SHUTDOWN\""));

    let parsed: ControlMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.command, Command::AgentShutdown);
    assert_eq!(parsed.conversation_id(), None);
}

#[test]
fn wake_word_command_may_carry_an_id() {
    let json = r#"{
        "message_id": "m-1",
        "timestamp": "2026-08-08T10:00:00Z",
        "command": "START_LISTENING_WAKE_WORD",
        "payload": { "conversation_id": "conv-9" }
    }"#;

    let parsed: ControlMessage = serde_json::from_str(json).unwrap();
    assert_eq!(
        parsed.command,
        Command::StartListeningWakeWord {
            conversation_id: Some("conv-9".to_string())
        }
    );
}

#[test]
fn unknown_commands_are_rejected() {
    let json = r#"{
        "message_id": "m-2",
        "timestamp": "2026-08-08T10:00:00Z",
        "command": "SELF_DESTRUCT",
        "payload": {}
    }"#;

    assert!(serde_json::from_str::<ControlMessage>(json).is_err());
}

#[test]
fn reply_ready_round_trips_with_blob_reference() {
    let msg = ControlMessage::new(Command::ReplyReady {
        conversation_id: "conv-7".to_string(),
        data: DataReference::Blob {
            reference: "2026/08/08/conv-7-abc.bin".to_string(),
        },
        text: Some("Hello!".to_string()),
        playback_duration_secs: Some(1.25),
    });

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"command\":\"REPLY_READY\""));
    assert!(json.contains("\"type\":\"blob\""));

    let parsed: ControlMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.command, msg.command);
}

#[test]
fn audio_chunk_final_marker() {
    let msg = AudioChunkMessage {
        conversation_id: "conv-1".to_string(),
        sequence: 10,
        data: DataReference::Inline {
            data: String::new(),
        },
        sample_rate: 16000,
        channels: 1,
        timestamp: chrono::Utc::now(),
        final_chunk: true,
        speech_detected: false,
    };

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"final\":true"));
    assert!(json.contains("\"speech_detected\":false"));
    assert!(json.contains("\"sequence\":10"));

    let parsed: AudioChunkMessage = serde_json::from_str(&json).unwrap();
    assert!(parsed.final_chunk);
    assert!(!parsed.speech_detected);
    assert_eq!(parsed.sequence, 10);
}

#[test]
fn inline_pcm_round_trips_through_a_chunk() {
    let original_samples: Vec<i16> = vec![100, -200, 300, -400];
    let pcm_bytes: Vec<u8> = original_samples
        .iter()
        .flat_map(|&s| s.to_le_bytes())
        .collect();

    let msg = AudioChunkMessage {
        conversation_id: "conv-1".to_string(),
        sequence: 0,
        data: DataReference::Inline {
            data: base64::engine::general_purpose::STANDARD.encode(&pcm_bytes),
        },
        sample_rate: 16000,
        channels: 1,
        timestamp: chrono::Utc::now(),
        final_chunk: false,
        speech_detected: true,
    };

    let json = serde_json::to_string(&msg).unwrap();
    let parsed: AudioChunkMessage = serde_json::from_str(&json).unwrap();

    let DataReference::Inline { data } = parsed.data else {
        panic!("expected inline data");
    };
    let decoded_bytes = base64::engine::general_purpose::STANDARD
        .decode(&data)
        .unwrap();
    let decoded_samples: Vec<i16> = decoded_bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();

    assert_eq!(decoded_samples, original_samples);
}
