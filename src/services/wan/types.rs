use crate::core::traits::Envelope;
use crate::core::types::BaseResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Code the backend reports for a missing or expired session
pub const LOGIN_EXPIRED_CODE: &str = "-1001";

/// `{"errorCode": 0, "errorMsg": "", "data": ...}`; zero means success
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WanResponse<T> {
    pub error_code: i64,
    #[serde(default)]
    pub error_msg: Option<String>,
    pub data: Option<T>,
}

impl<T: Send + 'static> Envelope for WanResponse<T> {
    type Data = T;

    fn into_base(self) -> BaseResponse<T> {
        BaseResponse {
            success: self.error_code == 0,
            data: self.data,
            message: self.error_msg.unwrap_or_default(),
            code: self.error_code.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginResponse {
    pub admin: bool,
    pub chapter_tops: Vec<Value>,
    pub coin_count: i64,
    pub collect_ids: Vec<i64>,
    pub email: String,
    pub icon: String,
    pub id: i64,
    pub nickname: String,
    pub public_name: String,
    #[serde(rename = "type")]
    pub kind: i32,
    pub username: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub link: String,
    pub author: String,
    pub share_user: String,
    pub nice_date: String,
    pub collect: bool,
    pub super_chapter_name: String,
    pub chapter_name: String,
    pub publish_time: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArticleList {
    pub cur_page: i32,
    pub datas: Vec<Article>,
    pub page_count: i32,
    pub total: i32,
    pub over: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Banner {
    pub id: i64,
    pub title: String,
    pub image_path: String,
    pub url: String,
    pub desc: String,
    pub order: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ApiError;

    #[test]
    fn test_login_success_envelope() {
        let response: WanResponse<LoginResponse> = serde_json::from_str(
            r#"{"errorCode":0,"errorMsg":"","data":{"id":1,"username":"u","type":0}}"#,
        )
        .unwrap();
        let user = response.into_base().into_result().unwrap();
        assert_eq!(user.id, 1);
        assert_eq!(user.username, "u");
    }

    #[test]
    fn test_null_data_is_empty_data_error() {
        let response: WanResponse<LoginResponse> =
            serde_json::from_str(r#"{"errorCode":0,"errorMsg":"","data":null}"#).unwrap();
        assert_eq!(
            response.into_base().into_result(),
            Err(ApiError::EmptyData {
                code: "0".to_string()
            })
        );
    }

    #[test]
    fn test_business_error_wins_over_missing_data() {
        let response: WanResponse<LoginResponse> = serde_json::from_str(
            r#"{"errorCode":-1,"errorMsg":"bad credentials","data":null}"#,
        )
        .unwrap();
        assert_eq!(
            response.into_base().into_result(),
            Err(ApiError::Business {
                code: "-1".to_string(),
                message: "bad credentials".to_string()
            })
        );
    }
}
