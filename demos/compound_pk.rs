use pkmapper::*;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

#[derive(Debug, Serialize, Deserialize)]
pub struct Order {
    pub customer: i64,
    pub number: Option<i64>,
    pub note: String,
}

fn tables() -> Vec<TableSchema> {
    vec![
        TableSchema::new("orders")
            .column(ColumnSchema::new("customer", "bigint").primary())
            .column(ColumnSchema::new("number", "bigint").primary().serial())
            .column(ColumnSchema::new("note", "text").not_null())
            .relation(Relation::new(
                "order_lines",
                &[("customer", "customer"), ("number", "order_number")],
            )),
        TableSchema::new("order_lines")
            .column(ColumnSchema::new("id", "bigint").primary().serial())
            .column(ColumnSchema::new("customer", "bigint").not_null())
            .column(ColumnSchema::new("order_number", "bigint").not_null())
            .column(ColumnSchema::new("sku", "text").not_null()),
    ]
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = OrmConfig::from_env()?;
    let orm = Orm::connect(&config, Catalog::new(tables())?).await?;
    orm.migrate().await?;

    let orders = orm.typed::<Order>("orders")?;
    let order = orders
        .save(&Order {
            customer: 42,
            number: None,
            note: "first order".into(),
        })
        .await?;
    info!(?order, "saved new order");

    let deep = orm
        .table("orders")?
        .insert_json(json!({
            "customer": 42,
            "note": "with lines",
            "order_lines": [{"sku": "A-1"}, {"sku": "B-2"}]
        }))
        .await?;
    info!(order = %deep.to_json(), "inserted order with lines");

    match orm
        .insert("orders", Record::new().with("note", "no customer"))
        .await
    {
        Err(err @ OrmError::MissingKeyColumns { .. }) => info!(%err, "rejected"),
        other => info!(?other, "unexpected"),
    }

    orm.close().await;
    Ok(())
}
