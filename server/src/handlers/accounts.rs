use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::{
    accounts::{AccountManager, MAX_PASSWORD_BYTES},
    error::{ApiError, Result},
};

/// Form body shared by every credential route.
#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub uname: String,
    pub pass: String,
}

impl Credentials {
    pub fn validate(&self) -> Result<()> {
        if self.uname.is_empty() || self.pass.is_empty() {
            return Err(ApiError::BadRequest(
                "uname and pass must not be empty".to_string(),
            ));
        }
        if self.pass.len() > MAX_PASSWORD_BYTES {
            return Err(ApiError::BadRequest(format!(
                "pass must not exceed {} bytes",
                MAX_PASSWORD_BYTES
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct AccountCreatedResponse {
    #[serde(rename = "accountID")]
    pub account_id: String,
}

pub async fn create_account(
    form: web::Form<Credentials>,
    accounts: web::Data<AccountManager>,
) -> Result<HttpResponse> {
    form.validate()?;

    let account = accounts.create_account(&form.uname, &form.pass).await?;

    Ok(HttpResponse::Created().json(AccountCreatedResponse {
        account_id: account.account_id,
    }))
}

pub async fn delete_account(
    form: web::Form<Credentials>,
    accounts: web::Data<AccountManager>,
) -> Result<HttpResponse> {
    form.validate()?;

    accounts.delete_account(&form.uname, &form.pass).await?;

    Ok(HttpResponse::NoContent().finish())
}
