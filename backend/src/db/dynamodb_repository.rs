use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::RepositoryError;
use crate::auth::models::{NewAccount, UserAccount};

/// Partition key of the item holding the id counter. Not a valid email, so
/// it cannot collide with an account row.
const SEQUENCE_KEY: &str = "#sequence";
const SEQUENCE_ATTR: &str = "last_id";

/// Accounts in one DynamoDB table keyed by `email` (string partition key).
#[derive(Clone)]
pub struct DynamoDbRepository {
    client: Client,
    users_table: String,
}

fn dynamo_err<E>(e: E) -> RepositoryError
where
    E: std::error::Error,
{
    RepositoryError::DynamoDb(DisplayErrorContext(e).to_string())
}

impl DynamoDbRepository {
    pub fn new(client: Client, users_table: String) -> Self {
        Self {
            client,
            users_table,
        }
    }

    /// Checks that the table is reachable; called once at startup.
    pub async fn verify_table(&self) -> Result<(), RepositoryError> {
        let response = self
            .client
            .describe_table()
            .table_name(&self.users_table)
            .send()
            .await
            .map_err(|e| {
                log::error!(
                    "DynamoDB table '{}' does not exist or is not accessible",
                    self.users_table
                );
                dynamo_err(e)
            })?;
        log::info!(
            "DynamoDB table '{}' status: {:?}",
            self.users_table,
            response.table().and_then(|t| t.table_status())
        );
        Ok(())
    }

    async fn next_id(&self) -> Result<i64, RepositoryError> {
        let result = self
            .client
            .update_item()
            .table_name(&self.users_table)
            .key("email", AttributeValue::S(SEQUENCE_KEY.to_string()))
            .update_expression("ADD #seq :one")
            .expression_attribute_names("#seq", SEQUENCE_ATTR)
            .expression_attribute_values(":one", AttributeValue::N("1".to_string()))
            .return_values(ReturnValue::UpdatedNew)
            .send()
            .await
            .map_err(dynamo_err)?;

        result
            .attributes
            .as_ref()
            .and_then(|attrs| attrs.get(SEQUENCE_ATTR))
            .and_then(|v| v.as_n().ok())
            .and_then(|n| n.parse::<i64>().ok())
            .ok_or_else(|| RepositoryError::InvalidData("Invalid id counter".to_string()))
    }

    pub async fn create_account(&self, account: NewAccount) -> Result<UserAccount, RepositoryError> {
        // cheap pre-check so duplicate signups don't consume ids; the
        // conditional put below is what actually guarantees uniqueness
        if self.find_by_email(&account.email).await?.is_some() {
            return Err(RepositoryError::EmailTaken);
        }

        let stored = account.into_account(self.next_id().await?, Utc::now());
        log::info!(
            "Creating account {} in DynamoDB table '{}'",
            stored.id,
            self.users_table
        );

        let mut item = HashMap::new();
        item.insert("email".to_string(), AttributeValue::S(stored.email.clone()));
        item.insert("id".to_string(), AttributeValue::N(stored.id.to_string()));
        item.insert("name".to_string(), AttributeValue::S(stored.name.clone()));
        item.insert(
            "password_hash".to_string(),
            AttributeValue::S(stored.password_hash.clone()),
        );
        item.insert(
            "created_at".to_string(),
            AttributeValue::S(stored.created_at.to_rfc3339()),
        );

        match self
            .client
            .put_item()
            .table_name(&self.users_table)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(email)")
            .send()
            .await
        {
            Ok(_) => Ok(stored),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_conditional_check_failed_exception() {
                    Err(RepositoryError::EmailTaken)
                } else {
                    log::error!("DynamoDB put_item failed for {}: {:?}", stored.email, service_error);
                    Err(dynamo_err(service_error))
                }
            }
        }
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>, RepositoryError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.users_table)
            .key("email", AttributeValue::S(email.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(dynamo_err)?;

        match result.item {
            Some(item) => Ok(Some(parse_account_from_item(item)?)),
            None => Ok(None),
        }
    }

    pub async fn list_accounts(&self) -> Result<Vec<UserAccount>, RepositoryError> {
        let mut accounts = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let result = self
                .client
                .scan()
                .table_name(&self.users_table)
                .filter_expression("attribute_exists(password_hash)")
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(dynamo_err)?;

            for item in result.items.unwrap_or_default() {
                accounts.push(parse_account_from_item(item)?);
            }

            match result.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        accounts.sort_by_key(|a| a.id);
        Ok(accounts)
    }
}

fn string_attr(
    item: &HashMap<String, AttributeValue>,
    name: &str,
) -> Result<String, RepositoryError> {
    item.get(name)
        .and_then(|v| v.as_s().ok())
        .cloned()
        .ok_or_else(|| RepositoryError::InvalidData(format!("Invalid {}", name)))
}

fn parse_account_from_item(
    item: HashMap<String, AttributeValue>,
) -> Result<UserAccount, RepositoryError> {
    let id = item
        .get("id")
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse::<i64>().ok())
        .ok_or_else(|| RepositoryError::InvalidData("Invalid account id".to_string()))?;

    let created_at = item
        .get("created_at")
        .and_then(|v| v.as_s().ok())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| RepositoryError::InvalidData("Invalid created_at".to_string()))?;

    Ok(UserAccount {
        id,
        name: string_attr(&item, "name")?,
        email: string_attr(&item, "email")?,
        password_hash: string_attr(&item, "password_hash")?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> HashMap<String, AttributeValue> {
        HashMap::from([
            ("email".to_string(), AttributeValue::S("leaf@farm.io".into())),
            ("id".to_string(), AttributeValue::N("42".into())),
            ("name".to_string(), AttributeValue::S("Leaf".into())),
            ("password_hash".to_string(), AttributeValue::S("sha256$00$00".into())),
            (
                "created_at".to_string(),
                AttributeValue::S("2024-05-01T10:00:00+00:00".into()),
            ),
        ])
    }

    #[test]
    fn parses_account_item() {
        let account = parse_account_from_item(item()).unwrap();
        assert_eq!(account.id, 42);
        assert_eq!(account.email, "leaf@farm.io");
        assert_eq!(account.created_at.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn rejects_items_missing_fields() {
        let mut no_hash = item();
        no_hash.remove("password_hash");
        assert!(matches!(
            parse_account_from_item(no_hash),
            Err(RepositoryError::InvalidData(_))
        ));

        let mut bad_id = item();
        bad_id.insert("id".to_string(), AttributeValue::S("42".into()));
        assert!(parse_account_from_item(bad_id).is_err());
    }
}
