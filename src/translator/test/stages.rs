macro_rules! test_translate_query {
    ($func_name:ident,
     expected = Ok({
         collection: $collection:expr,
         projections: $projections:expr,
         pipeline: $pipeline:expr,
     }),
     input = $input:expr) => {
        #[test]
        fn $func_name() {
            use crate::{translate_query, translator::test::TestResolver, Translation};

            let resolver = TestResolver::new();
            let input = $input;
            let expected_projections: Vec<&str> = $projections;
            match translate_query(&input, &resolver) {
                Ok(Translation {
                    collection,
                    projections,
                    pipeline,
                    tql,
                }) => {
                    assert!(tql);
                    assert_eq!($collection, collection);
                    assert_eq!(expected_projections, projections);
                    assert_eq!($pipeline, pipeline);
                }
                Err(err) => panic!("translation failed: {err}"),
            }
        }
    };

    ($func_name:ident, expected = Err($expected_err:expr), input = $input:expr) => {
        #[test]
        fn $func_name() {
            use crate::{result, translate_query, translator::test::TestResolver};

            let resolver = TestResolver::new();
            let input = $input;
            let expected: result::Result<crate::Translation> = Err($expected_err.into());
            assert_eq!(expected, translate_query(&input, &resolver));
        }
    };
}

mod breakouts {
    use crate::translator::test::field;
    use crate::{
        fields::TableId,
        tql::{AggregationKind, Query, TemporalUnit},
    };
    use bson::doc;

    test_translate_query!(
        nested_field_breakout_with_count,
        expected = Ok({
            collection: "venues",
            projections: vec!["source___username", "count"],
            pipeline: vec![
                doc! {"$project": {"source___username": "$source.username"}},
                doc! {"$project": {"___group": {"source___username": "$source___username"}}},
                doc! {"$group": {"_id": "$___group", "count": {"$sum": 1}}},
                doc! {"$sort": {"_id": 1}},
                doc! {"$project": {
                    "_id": false,
                    "source___username": "$_id.source___username",
                    "count": true,
                }},
            ],
        }),
        input = {
            let mut query = Query::new(TableId(1));
            query.breakout = vec![field(7)];
            query.aggregations = vec![AggregationKind::Count.into()];
            query
        }
    );

    test_translate_query!(
        bucketed_breakout_computes_the_bucket_once,
        expected = Ok({
            collection: "venues",
            projections: vec!["created_at~~~month", "count"],
            pipeline: vec![
                doc! {"$project": {"created_at~~~month": {"$let": {
                    "vars": {"column": "$created_at"},
                    "in": {"___date": {"$dateToString": {"format": "%Y-%m", "date": "$$column"}}},
                }}}},
                doc! {"$project": {"___group": {"created_at~~~month": "$created_at~~~month"}}},
                doc! {"$group": {"_id": "$___group", "count": {"$sum": 1}}},
                doc! {"$sort": {"_id": 1}},
                doc! {"$project": {
                    "_id": false,
                    "created_at~~~month": "$_id.created_at~~~month",
                    "count": true,
                }},
            ],
        }),
        input = {
            let mut query = Query::new(TableId(1));
            query.breakout = vec![field(3).bucketed(TemporalUnit::Month)];
            query.aggregations = vec![AggregationKind::Count.into()];
            query
        }
    );

    test_translate_query!(
        aggregated_fields_ride_along_with_the_group_document,
        expected = Ok({
            collection: "venues",
            projections: vec!["source___username", "sum"],
            pipeline: vec![
                doc! {"$project": {
                    "source___username": "$source.username",
                    "price": "$price",
                }},
                doc! {"$project": {
                    "___group": {"source___username": "$source___username"},
                    "price": "$price",
                }},
                doc! {"$group": {"_id": "$___group", "sum": {"$sum": "$price"}}},
                doc! {"$sort": {"_id": 1}},
                doc! {"$project": {
                    "_id": false,
                    "source___username": "$_id.source___username",
                    "sum": true,
                }},
            ],
        }),
        input = {
            let mut query = Query::new(TableId(1));
            query.breakout = vec![field(7)];
            query.aggregations = vec![AggregationKind::Sum(field(1)).into()];
            query
        }
    );
}

mod filters {
    use crate::translator::test::{field, int, ts};
    use crate::{
        fields::TableId,
        tql::{Filter, Operand, Query, TemporalUnit},
    };
    use bson::doc;

    test_translate_query!(
        day_bucketed_filter_matches_the_envelope,
        expected = Ok({
            collection: "venues",
            projections: vec!["created_at~~~day"],
            pipeline: vec![
                doc! {"$project": {"created_at~~~day": {"$let": {
                    "vars": {"column": "$created_at"},
                    "in": {"___date": {"$dateToString": {"format": "%Y-%m-%d", "date": "$$column"}}},
                }}}},
                doc! {"$match": {"created_at~~~day": {"___date": "2024-03-01"}}},
            ],
        }),
        input = {
            let mut query = Query::new(TableId(1));
            query.filter = Some(Filter::Eq(
                field(3).bucketed(TemporalUnit::Day),
                Operand::AbsoluteDatetime {
                    ts: ts(2024, 3, 1, 0, 0, 0),
                    unit: TemporalUnit::Day,
                },
            ));
            query
        }
    );

    test_translate_query!(
        negated_between_emits_no_not,
        expected = Ok({
            collection: "venues",
            projections: vec!["price"],
            pipeline: vec![
                doc! {"$project": {"price": "$price"}},
                doc! {"$match": {"$or": [
                    {"price": {"$lt": 10_i64}},
                    {"price": {"$gt": 20_i64}},
                ]}},
            ],
        }),
        input = {
            let mut query = Query::new(TableId(1));
            query.filter = Some(Filter::Not(Box::new(Filter::Between {
                field: field(1),
                min: int(10),
                max: int(20),
            })));
            query
        }
    );
}

mod aggregations {
    use crate::translator::test::{field, int};
    use crate::{
        fields::TableId,
        tql::{AggregationKind, Filter, Query},
    };
    use bson::doc;

    test_translate_query!(
        share_expands_to_two_reducers_and_a_division,
        expected = Ok({
            collection: "venues",
            projections: vec!["share"],
            pipeline: vec![
                doc! {"$project": {"price": "$price"}},
                doc! {"$project": {"price": "$price"}},
                doc! {"$group": {
                    "_id": null,
                    "share__count_where": {"$sum": {"$cond": {
                        "if": {"$eq": ["$price", 5_i64]},
                        "then": 1,
                        "else": 0,
                    }}},
                    "share__count": {"$sum": 1},
                }},
                doc! {"$addFields": {"share": {"$divide": ["$share__count_where", "$share__count"]}}},
                doc! {"$sort": {"_id": 1}},
                doc! {"$project": {"_id": false, "share": true}},
            ],
        }),
        input = {
            let mut query = Query::new(TableId(1));
            query.aggregations =
                vec![AggregationKind::Share(Filter::Eq(field(1), int(5))).into()];
            query
        }
    );

    test_translate_query!(
        distinct_sizes_its_own_reduction,
        expected = Ok({
            collection: "venues",
            projections: vec!["distinct"],
            pipeline: vec![
                doc! {"$project": {"price": "$price"}},
                doc! {"$project": {"price": "$price"}},
                doc! {"$group": {"_id": null, "distinct": {"$addToSet": "$price"}}},
                doc! {"$addFields": {"distinct": {"$size": "$distinct"}}},
                doc! {"$sort": {"_id": 1}},
                doc! {"$project": {"_id": false, "distinct": true}},
            ],
        }),
        input = {
            let mut query = Query::new(TableId(1));
            query.aggregations = vec![AggregationKind::Distinct(field(1)).into()];
            query
        }
    );

    test_translate_query!(
        bare_count_groups_over_null,
        expected = Ok({
            collection: "venues",
            projections: vec!["count"],
            pipeline: vec![
                doc! {"$group": {"_id": null, "count": {"$sum": 1}}},
                doc! {"$sort": {"_id": 1}},
                doc! {"$project": {"_id": false, "count": true}},
            ],
        }),
        input = {
            let mut query = Query::new(TableId(1));
            query.aggregations = vec![AggregationKind::Count.into()];
            query
        }
    );
}

mod ordering_and_projection {
    use crate::translator::test::field;
    use crate::{
        fields::TableId,
        tql::{AggregationKind, OrderBy, OrderTarget, Query},
    };
    use bson::doc;

    test_translate_query!(
        order_by_references_escaped_names,
        expected = Ok({
            collection: "venues",
            projections: vec!["source___username"],
            pipeline: vec![
                doc! {"$project": {"source___username": "$source.username"}},
                doc! {"$sort": {"source___username": -1}},
            ],
        }),
        input = {
            let mut query = Query::new(TableId(1));
            query.order_by = vec![OrderBy::Desc(OrderTarget::Field(field(7)))];
            query
        }
    );

    test_translate_query!(
        order_by_aggregation_index_uses_its_assigned_name,
        expected = Ok({
            collection: "venues",
            projections: vec!["count"],
            pipeline: vec![
                doc! {"$group": {"_id": null, "count": {"$sum": 1}}},
                doc! {"$sort": {"_id": 1}},
                doc! {"$project": {"_id": false, "count": true}},
                doc! {"$sort": {"count": -1}},
            ],
        }),
        input = {
            let mut query = Query::new(TableId(1));
            query.aggregations = vec![AggregationKind::Count.into()];
            query.order_by = vec![OrderBy::Desc(OrderTarget::Aggregation(0))];
            query
        }
    );

    test_translate_query!(
        field_lists_override_prior_projections,
        expected = Ok({
            collection: "venues",
            projections: vec!["name", "price"],
            pipeline: vec![
                doc! {"$project": {"name": "$name", "price": "$price"}},
                doc! {"$project": {"_id": false, "name": "$name", "price": "$price"}},
                doc! {"$limit": 10_i64},
            ],
        }),
        input = {
            let mut query = Query::new(TableId(1));
            query.fields = vec![field(2), field(1)];
            query.limit = Some(10);
            query
        }
    );
}

mod paging {
    use crate::{
        fields::TableId,
        tql::{Page, Query},
    };
    use bson::doc;

    test_translate_query!(
        later_pages_skip_then_limit,
        expected = Ok({
            collection: "venues",
            projections: vec![],
            pipeline: vec![
                doc! {"$skip": 50_i64},
                doc! {"$limit": 25_i64},
            ],
        }),
        input = {
            let mut query = Query::new(TableId(1));
            query.page = Some(Page { page: 3, items: 25 });
            query
        }
    );

    test_translate_query!(
        the_first_page_needs_no_skip,
        expected = Ok({
            collection: "venues",
            projections: vec![],
            pipeline: vec![
                doc! {"$limit": 25_i64},
            ],
        }),
        input = {
            let mut query = Query::new(TableId(1));
            query.page = Some(Page { page: 1, items: 25 });
            query
        }
    );
}

mod errors {
    use crate::translator::test::field;
    use crate::{
        fields::{FieldId, TableId},
        tql::Query,
        translator::Error,
    };

    test_translate_query!(
        unknown_tables_fail_resolution,
        expected = Err(Error::TableResolution(TableId(99))),
        input = Query::new(TableId(99))
    );

    test_translate_query!(
        unknown_fields_fail_resolution,
        expected = Err(Error::FieldResolution(FieldId(42))),
        input = {
            let mut query = Query::new(TableId(1));
            query.breakout = vec![field(42)];
            query
        }
    );

    test_translate_query!(
        nonpositive_limits_are_invalid,
        expected = Err(Error::InvalidQuery("limit must be positive, got 0".to_string())),
        input = {
            let mut query = Query::new(TableId(1));
            query.limit = Some(0);
            query
        }
    );
}

mod invariants {
    use crate::translator::test::{field, int, TestResolver};
    use crate::{
        fields::TableId,
        tql::{AggregationKind, Filter, Page, Query, TemporalUnit},
        translate_query,
    };

    /// Every stage in every compiled pipeline is a single-key map, and the
    /// projections list matches the keys of the terminal projection.
    #[test]
    fn stages_are_single_key_and_projections_track_the_terminal_project() {
        let resolver = TestResolver::new();
        let mut query = Query::new(TableId(1));
        query.filter = Some(Filter::Gt(field(1), int(2)));
        query.breakout = vec![field(3).bucketed(TemporalUnit::Week)];
        query.aggregations = vec![
            AggregationKind::Count.into(),
            AggregationKind::Distinct(field(7)).into(),
        ];
        query.page = Some(Page { page: 2, items: 10 });

        let translation = translate_query(&query, &resolver).expect("translation failed");
        for stage in &translation.pipeline {
            assert_eq!(1, stage.len(), "stage with multiple keys: {stage:?}");
        }

        let terminal_project = translation
            .pipeline
            .iter()
            .rev()
            .find_map(|stage| stage.get_document("$project").ok())
            .expect("no $project stage");
        let terminal_columns: Vec<&str> = terminal_project
            .keys()
            .filter(|key| *key != "_id")
            .map(String::as_str)
            .collect();
        assert_eq!(translation.projections, terminal_columns);
    }
}
