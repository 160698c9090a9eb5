pub(crate) mod intents;
