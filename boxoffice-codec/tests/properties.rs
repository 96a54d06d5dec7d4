use boxoffice_codec::{
    plutus, Action, ActionRedeemer, ListingDatum, TicketDatum, TicketStatus,
};
use pallas_crypto::hash::Hash;
use proptest::prelude::*;

fn any_status() -> impl Strategy<Value = TicketStatus> {
    prop_oneof![Just(TicketStatus::Listed), Just(TicketStatus::Sold)]
}

prop_compose! {
    fn any_ticket_datum()(
        seller in any::<Vec<u8>>(),
        status in any_status(),
        price in proptest::option::of(any::<u64>()),
    ) -> TicketDatum {
        TicketDatum { seller, status, price }
    }
}

fn any_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        Just(Action::Buy),
        Just(Action::Cancel),
        Just(Action::UpdatePrice),
        Just(Action::Relock),
        Just(Action::Burn),
    ]
}

proptest! {
    #[test]
    fn structural_datum_survives_encoding(datum in any_ticket_datum()) {
        let raw = datum.encode().unwrap();
        prop_assert_eq!(ListingDatum::decode(&raw), ListingDatum::Structural(datum));
    }

    #[test]
    fn redeemer_survives_encoding(action in any_action(), actor in any::<[u8; 28]>()) {
        let redeemer = ActionRedeemer::new(action, Hash::new(actor));
        let raw = redeemer.encode().unwrap();

        prop_assert_eq!(ActionRedeemer::decode(&raw).unwrap(), redeemer);
    }

    #[test]
    fn decode_never_panics(raw in any::<Vec<u8>>()) {
        let datum = ListingDatum::decode(&raw);

        // whatever parses as plutus data must not be reported as malformed
        if plutus::from_cbor(&raw).is_ok() {
            prop_assert!(!matches!(datum, ListingDatum::Malformed(_)));
        }
    }
}
