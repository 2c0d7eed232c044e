/// Logs how many constraints and witnesses a block of gadget code adds for a relation.
#[macro_export]
macro_rules! track_constraints {
    ($cs:expr, $relation:expr, $stage:expr, $code:expr) => {{
        let cs = $cs;
        let constraints_before = cs.num_constraints();
        let witnesses_before = cs.num_witness_variables();

        let result = $code;

        tracing::debug!(
            target: "zk_card_engine::relations",
            relation = %$relation,
            stage = $stage,
            constraints_added = cs.num_constraints() - constraints_before,
            witnesses_added = cs.num_witness_variables() - witnesses_before,
            "constraint tracking"
        );

        result
    }};
}
