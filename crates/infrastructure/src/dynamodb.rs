use aws_sdk_dynamodb::config::Region;
use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::operation::describe_table::DescribeTableError;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, GlobalSecondaryIndex, KeySchemaElement, KeyType, Projection,
    ProjectionType, ScalarAttributeType,
};
use aws_sdk_dynamodb::Client;
use shared::Config;
use todo_domain::{TodoError, TodoResult};
use tracing::{error, info};

/// ユーザー別一覧用のグローバルセカンダリインデックス名
pub const USER_INDEX: &str = "GSI1";

#[derive(Clone)]
pub struct DynamoDbClient {
    client: Client,
    table_name: String,
}

impl DynamoDbClient {
    pub async fn new(config: &Config) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.aws_region.clone()));
        if let Some(endpoint) = &config.dynamodb_endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let aws_config = loader.load().await;

        Self {
            client: Client::new(&aws_config),
            table_name: config.dynamodb_table.clone(),
        }
    }

    pub fn from_client(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// テーブルが存在しなければ作成する（DynamoDB Local 向け）
    pub async fn ensure_table(&self) -> TodoResult<()> {
        match self
            .client
            .describe_table()
            .table_name(&self.table_name)
            .send()
            .await
        {
            Ok(_) => return Ok(()),
            Err(e) if table_is_missing(&e) => {}
            Err(e) => {
                error!(
                    table = %self.table_name,
                    error = %DisplayErrorContext(&e),
                    "Failed to describe DynamoDB table"
                );
                return Err(TodoError::Transport(DisplayErrorContext(&e).to_string()));
            }
        }

        info!(table = %self.table_name, "Creating DynamoDB table");

        self.client
            .create_table()
            .table_name(&self.table_name)
            .billing_mode(BillingMode::PayPerRequest)
            .attribute_definitions(string_attribute("PK")?)
            .attribute_definitions(string_attribute("SK")?)
            .attribute_definitions(string_attribute("GSI1PK")?)
            .attribute_definitions(string_attribute("GSI1SK")?)
            .key_schema(key_element("PK", KeyType::Hash)?)
            .key_schema(key_element("SK", KeyType::Range)?)
            .global_secondary_indexes(
                GlobalSecondaryIndex::builder()
                    .index_name(USER_INDEX)
                    .key_schema(key_element("GSI1PK", KeyType::Hash)?)
                    .key_schema(key_element("GSI1SK", KeyType::Range)?)
                    .projection(
                        Projection::builder()
                            .projection_type(ProjectionType::All)
                            .build(),
                    )
                    .build()
                    .map_err(build_error)?,
            )
            .send()
            .await
            .map_err(|e| TodoError::Transport(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }
}

/// テーブルが存在しないことを示すエラーだけを作成対象とする
fn table_is_missing<R>(err: &SdkError<DescribeTableError, R>) -> bool {
    err.as_service_error()
        .is_some_and(|e| e.is_resource_not_found_exception())
}

fn string_attribute(name: &str) -> TodoResult<AttributeDefinition> {
    AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(ScalarAttributeType::S)
        .build()
        .map_err(build_error)
}

fn key_element(name: &str, key_type: KeyType) -> TodoResult<KeySchemaElement> {
    KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(key_type)
        .build()
        .map_err(build_error)
}

fn build_error(e: aws_sdk_dynamodb::error::BuildError) -> TodoError {
    TodoError::Transport(format!("Invalid table definition: {e}"))
}
