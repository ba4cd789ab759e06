use proptest::collection::vec;
use proptest::prelude::*;

use crate::packet::{decode, encode, Packet};
use crate::payload::*;
use crate::simple::*;
use crate::{padded_len, MessageType, TAG_LEN};

fn any_text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ._-]{0,40}"
}

prop_compose! {
    fn any_discovery_request()(flags in any::<u32>(), client_type in any::<u16>(), min in any::<u16>(), max in any::<u16>())
        -> DiscoveryRequest {
        DiscoveryRequest { flags, client_type, min_version: min, max_version: max }
    }
}

prop_compose! {
    fn any_discovery_response()(
        flags in any::<u32>(),
        client_type in any::<u16>(),
        name in any_text(),
        uuid in any_text(),
        last_error in any::<u32>(),
        certificate in vec(any::<u8>(), 1..600),
    ) -> DiscoveryResponse {
        DiscoveryResponse { flags, client_type, name, uuid, last_error, certificate }
    }
}

prop_compose! {
    fn any_protected()(len in 1u16..256)(
        len in Just(len),
        body in vec(any::<u8>(), padded_len(len as usize)),
        tag in vec(any::<u8>(), TAG_LEN),
    ) -> (u16, Vec<u8>, Vec<u8>) {
        (len, body, tag)
    }
}

prop_compose! {
    fn any_connect_request()(
        client_uuid in any::<[u8; 16]>(),
        public_key in vec(any::<u8>(), 64),
        iv in any::<[u8; 16]>(),
        (protected_len, protected, tag) in any_protected(),
    ) -> ConnectRequest {
        ConnectRequest {
            client_uuid,
            public_key_type: PublicKeyType::EcdhP256,
            public_key,
            iv,
            protected_len,
            protected,
            tag,
        }
    }
}

prop_compose! {
    fn any_connect_response()(iv in any::<[u8; 16]>(), (protected_len, protected, tag) in any_protected())
        -> ConnectResponse {
        ConnectResponse { iv, protected_len, protected, tag }
    }
}

fn any_simple_packet() -> impl Strategy<Value = SimplePacket> {
    prop_oneof![
        any_discovery_request().prop_map(SimplePacket::DiscoveryRequest),
        any_discovery_response().prop_map(SimplePacket::DiscoveryResponse),
        "[A-F0-9]{16}".prop_map(|live_id| SimplePacket::PowerOnRequest(PowerOnRequest { live_id })),
        any_connect_request().prop_map(SimplePacket::ConnectRequest),
        any_connect_response().prop_map(SimplePacket::ConnectResponse),
    ]
}

proptest! {
    #[test]
    fn simple_packets_round_trip(packet in any_simple_packet()) {
        let packet = Packet::Simple(packet);
        let bytes = encode(&packet).unwrap();
        prop_assert_eq!(decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn decode_never_panics(bytes in vec(any::<u8>(), 0..512)) {
        let _ = decode(&bytes);
    }

    #[test]
    fn truncated_simple_packets_fail(packet in any_simple_packet(), cut in 1usize..8) {
        let bytes = encode(&Packet::Simple(packet)).unwrap();
        let cut = cut.min(bytes.len() - 1);
        prop_assert!(decode(&bytes[..bytes.len() - cut]).is_err());
    }

    #[test]
    fn console_status_round_trip(
        major in any::<u32>(),
        locale in any_text(),
        titles in vec((any::<u32>(), any::<bool>(), 0u16..0x8000, any_text()), 0..4),
    ) {
        let status = ConsoleStatus {
            live_tv_provider: 0,
            major_version: major,
            minor_version: 0,
            build_number: 1,
            locale,
            active_titles: titles
                .into_iter()
                .map(|(title_id, has_focus, title_location, aum)| ActiveTitle {
                    title_id,
                    has_focus,
                    title_location,
                    product_id: uuid::Uuid::nil(),
                    sandbox_id: uuid::Uuid::nil(),
                    aum,
                })
                .collect(),
        };
        let payload = MessagePayload::ConsoleStatus(status);
        let bytes = payload.encode().unwrap();
        prop_assert_eq!(MessagePayload::decode(MessageType::ConsoleStatus, &bytes).unwrap(), payload);
    }

    #[test]
    fn ack_round_trip(low in any::<u32>(), processed in vec(any::<u32>(), 0..8), rejected in vec(any::<u32>(), 0..8)) {
        let payload = MessagePayload::Ack(Ack { low_watermark: low, processed, rejected });
        let bytes = payload.encode().unwrap();
        prop_assert_eq!(MessagePayload::decode(MessageType::Ack, &bytes).unwrap(), payload);
    }
}
