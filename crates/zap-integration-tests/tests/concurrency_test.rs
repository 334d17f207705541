//! Concurrent access to a shared market.
//!
//! Many holders bond, query, cancel and unbond from separate threads. Each
//! public operation is atomic, so the final state must balance exactly no
//! matter how the threads interleave.

use std::thread;

use zap_core::{Address, Curve, Formula, PricingMode, QueryResponse};
use zap_integration_tests::{STARTING_BALANCE, Scenario};
use zap_ledger::Token;

const HOLDERS: usize = 8;
const ROUNDS: u64 = 25;

#[test]
fn parallel_holders_keep_ledger_balanced() {
    let s = Scenario::new(
        Curve::single(Formula::quadratic(1, 3), 100_000).expect("valid curve"),
        PricingMode::ClosedForm,
    )
    .expect("scenario");
    let holders: Vec<Address> = (0..HOLDERS).map(|i| s.account(&format!("holder-{i}"))).collect();

    thread::scope(|scope| {
        for holder in &holders {
            let s = &s;
            scope.spawn(move || {
                let market = &s.local.market;
                for round in 0..ROUNDS {
                    market
                        .ledger()
                        .bond(holder, &s.provider, &s.endpoint, 3)
                        .expect("bond");
                    let id = market
                        .dispatch()
                        .query(holder, &s.provider, &s.endpoint, "tick", vec![])
                        .expect("query");
                    if round % 2 == 0 {
                        // The provider may answer first; either outcome settles the dot.
                        let _ = market.dispatch().cancel_query(holder, id);
                    }
                    market
                        .ledger()
                        .unbond(holder, &s.provider, &s.endpoint, 1)
                        .expect("unbond");
                }
            });
        }

        // The provider answers whatever is pending while holders work.
        scope.spawn(|| {
            let market = &s.local.market;
            for _ in 0..200 {
                for query in market.dispatch().pending_for_provider(&s.provider) {
                    // A holder may cancel between listing and answering.
                    let _ = market
                        .dispatch()
                        .respond(&s.provider, query.id, QueryResponse::Single("ok".into()));
                }
                thread::yield_now();
            }
        });
    });

    // Answer anything left over.
    let market = &s.local.market;
    for query in market.dispatch().pending_for_provider(&s.provider) {
        market
            .dispatch()
            .respond(&s.provider, query.id, QueryResponse::Single("late".into()))
            .expect("respond");
    }

    let ledger = market.ledger();
    assert!(ledger.conservation_violations().is_empty());
    assert_eq!(
        market.dispatch().query_count(),
        HOLDERS * ROUNDS as usize
    );

    // every holder bonded 3 and unbonded 1 per round; answered queries moved
    // one dot each to the provider
    let answered = s.bound(&s.provider);
    let held: u64 = holders.iter().map(|h| s.bound(h) + s.escrowed(h)).sum();
    assert_eq!(held + answered, HOLDERS as u64 * ROUNDS * 2);
    assert!(answered >= HOLDERS as u64 * (ROUNDS / 2));
    assert!(holders.iter().all(|h| s.escrowed(h) == 0));

    let locked = ledger.zap_bound(&s.provider, &s.endpoint).expect("zap bound");
    assert_eq!(s.local.token.balance_of(ledger.custody()), locked);
    let spent: u128 = holders
        .iter()
        .map(|h| STARTING_BALANCE - s.local.token.balance_of(h).base_units())
        .sum();
    assert_eq!(spent, locked.base_units());
}
