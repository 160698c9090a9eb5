use crate::api::{PARAM_ACCOUNT_ID, PARAM_GAME, intent_ids};
use crate::engine::BucketMask;
use crate::{Dimension, Game, IntentMeta, Marker, ParamValue, Rule, SlotValue, Token};

use crate::rules::intents::{
    helpers::{find_account_id, find_game, first_match_group, game_from_word, has_marker},
    predicates::{is_account_ref, is_game, is_greeting, is_last_match, is_link_verb, is_profile_account},
};

const WORDS: u32 = BucketMask::CYRILLIC.bits() | BucketMask::LATIN.bits();

/// All built-in rules: terminals first, then intent rules in tie-break order.
pub fn get() -> Vec<Rule> {
    let mut rules = terminal_rules();
    rules.extend(intent_rules());
    rules
}

fn terminal_rules() -> Vec<Rule> {
    vec![
        rule! {
            name: "greeting word",
            pattern: [re!(r"прив(?:ет)?|здарова?|хай|hello|hi")],
            buckets: WORDS,
            prod: |_tokens: &[Token]| -> Option<Marker> { Some(Marker::Greeting) },
        },
        rule! {
            name: "last match word",
            pattern: [re!(r"лм|(?:последняя ?)?игра|(?:ласт ?)?катка|!?last ?match|!?lm")],
            buckets: WORDS,
            prod: |_tokens: &[Token]| -> Option<Marker> { Some(Marker::LastMatch) },
        },
        rule! {
            name: "link verb",
            pattern: [re!(r"привяжи|link")],
            buckets: WORDS,
            prod: |_tokens: &[Token]| -> Option<Marker> { Some(Marker::Link) },
        },
        rule! {
            name: "game (pubg)",
            pattern: [re!(r"pubg|пубг|пабг|пабж|бабаджи|baba ?gee")],
            buckets: WORDS,
            prod: |tokens: &[Token]| -> Option<SlotValue> {
                game_from_word(first_match_group(tokens, 0)?).map(SlotValue::Game)
            },
        },
        rule! {
            name: "game (dota)",
            pattern: [re!(r"(?:dota|dotes|дота|доту|дока|доку)(?: ?(?:2|two|два))?")],
            buckets: WORDS,
            prod: |tokens: &[Token]| -> Option<SlotValue> {
                game_from_word(first_match_group(tokens, 0)?).map(SlotValue::Game)
            },
        },
        rule! {
            name: "opendota profile url",
            pattern: [re!(r"(?:https?://)?(?:www\.)?opendota\.com/players/(\d+)/?")],
            buckets: BucketMask::HAS_URL.bits(),
            prod: |tokens: &[Token]| -> Option<SlotValue> {
                first_match_group(tokens, 1)?.parse().ok().map(SlotValue::AccountId)
            },
        },
        rule! {
            name: "digits",
            pattern: [re!(r"\d+")],
            buckets: BucketMask::HAS_DIGITS.bits(),
            prod: |tokens: &[Token]| -> Option<SlotValue> {
                Some(SlotValue::Digits(first_match_group(tokens, 0)?.to_string()))
            },
        },
    ]
}

fn intent_rules() -> Vec<Rule> {
    vec![
        rule! {
            name: "link account",
            intent: intent_ids::LINK_ACCOUNT,
            pattern: [pred!(is_link_verb), pred!(is_account_ref)],
            deps: [Dimension::Marker, Dimension::Slot],
            prod: |tokens: &[Token]| -> Option<IntentMeta> {
                let id = find_account_id(tokens)?;
                Some(IntentMeta::new(intent_ids::LINK_ACCOUNT).with_param(PARAM_ACCOUNT_ID, ParamValue::Integer(id)))
            },
        },
        rule! {
            name: "link account (bare url)",
            intent: intent_ids::LINK_ACCOUNT,
            pattern: [pred!(is_profile_account)],
            deps: [Dimension::Slot],
            prod: |tokens: &[Token]| -> Option<IntentMeta> {
                let id = find_account_id(tokens)?;
                Some(IntentMeta::new(intent_ids::LINK_ACCOUNT).with_param(PARAM_ACCOUNT_ID, ParamValue::Integer(id)))
            },
        },
        rule! {
            name: "last match in <game>",
            intent: intent_ids::LAST_MATCH,
            pattern: [pred!(is_last_match), opt!(r"в|in"), pred!(is_game)],
            deps: [Dimension::Marker, Dimension::Slot],
            prod: |tokens: &[Token]| -> Option<IntentMeta> { last_match(find_game(tokens)?) },
        },
        rule! {
            name: "<game> last match",
            intent: intent_ids::LAST_MATCH,
            pattern: [pred!(is_game), pred!(is_last_match)],
            deps: [Dimension::Marker, Dimension::Slot],
            prod: |tokens: &[Token]| -> Option<IntentMeta> { last_match(find_game(tokens)?) },
        },
        rule! {
            name: "last match",
            intent: intent_ids::LAST_MATCH,
            pattern: [pred!(is_last_match)],
            deps: [Dimension::Marker],
            prod: |_tokens: &[Token]| -> Option<IntentMeta> { last_match(Game::Dota) },
        },
        rule! {
            name: "greeting",
            intent: intent_ids::GREETING,
            pattern: [pred!(is_greeting)],
            deps: [Dimension::Marker],
            prod: |tokens: &[Token]| -> Option<IntentMeta> {
                has_marker(tokens, Marker::Greeting).then(|| IntentMeta::new(intent_ids::GREETING))
            },
        },
    ]
}

fn last_match(game: Game) -> Option<IntentMeta> {
    Some(IntentMeta::new(intent_ids::LAST_MATCH).with_param(PARAM_GAME, ParamValue::Game(game)))
}
